//! Addressable node identity: `name@domain/instance`.

use std::fmt::{self, Display};
use std::str::FromStr;
use thiserror::Error;

/// An addressable identity within LIME: `name@domain/instance`, where `name`
/// and the `/instance` suffix are both optional.
///
/// `Node::parse` and `Node::to_string` are inverses on any string this type
/// produces; see the unit tests for the exact round-trip cases.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Node {
    name: Option<String>,
    domain: String,
    instance: Option<String>,
}

/// A node's `(name, domain)` pair, with instance stripped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    name: Option<String>,
    domain: String,
}

/// An error produced while parsing a [`Node`] from its string form.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum NodeParseError {
    #[error("node string is empty")]
    Empty,
    #[error("missing domain in node string `{0}`")]
    MissingDomain(String),
}

impl Node {
    /// Construct a node directly from its parts.
    pub fn new(
        name: impl Into<Option<String>>,
        domain: impl Into<String>,
        instance: impl Into<Option<String>>,
    ) -> Self {
        Node {
            name: name.into(),
            domain: domain.into(),
            instance: instance.into(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn instance(&self) -> Option<&str> {
        self.instance.as_deref()
    }

    pub fn set_domain(&mut self, domain: impl Into<String>) {
        self.domain = domain.into();
    }

    /// The `(name, domain)` identity of this node, discarding the instance.
    pub fn to_identity(&self) -> Identity {
        Identity {
            name: self.name.clone(),
            domain: self.domain.clone(),
        }
    }

    /// Parse a node from its wire syntax `name@domain/instance`.
    pub fn parse(s: &str) -> Result<Node, NodeParseError> {
        s.parse()
    }
}

impl FromStr for Node {
    type Err = NodeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(NodeParseError::Empty);
        }

        let (rest, instance) = match s.split_once('/') {
            Some((rest, instance)) => (rest, Some(instance.to_string())),
            None => (s, None),
        };

        let (name, domain) = match rest.split_once('@') {
            Some((name, domain)) => (Some(name.to_string()), domain),
            None => (None, rest),
        };

        if domain.is_empty() {
            return Err(NodeParseError::MissingDomain(s.to_string()));
        }

        Ok(Node {
            name,
            domain: domain.to_string(),
            instance,
        })
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.name {
            write!(f, "{}@", name)?;
        }
        write!(f, "{}", self.domain)?;
        if let Some(instance) = &self.instance {
            write!(f, "/{}", instance)?;
        }
        Ok(())
    }
}

impl Identity {
    pub fn new(name: impl Into<Option<String>>, domain: impl Into<String>) -> Self {
        Identity {
            name: name.into(),
            domain: domain.into(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }
}

impl Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.name {
            write!(f, "{}@", name)?;
        }
        write!(f, "{}", self.domain)
    }
}

impl FromStr for Identity {
    type Err = NodeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Node::from_str(s)?.to_identity())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_full_node() {
        let node: Node = "alice@example.com/home".parse().unwrap();
        assert_eq!(node.name(), Some("alice"));
        assert_eq!(node.domain(), "example.com");
        assert_eq!(node.instance(), Some("home"));
        assert_eq!(node.to_string(), "alice@example.com/home");
    }

    #[test]
    fn round_trips_domain_only() {
        let node: Node = "example.com".parse().unwrap();
        assert_eq!(node.name(), None);
        assert_eq!(node.instance(), None);
        assert_eq!(node.to_string(), "example.com");
    }

    #[test]
    fn round_trips_domain_and_instance() {
        let node: Node = "example.com/work".parse().unwrap();
        assert_eq!(node.to_string(), "example.com/work");
    }

    #[test]
    fn rejects_empty_string() {
        assert_eq!(Node::parse(""), Err(NodeParseError::Empty));
    }

    #[test]
    fn rejects_missing_domain() {
        assert!(matches!(
            Node::parse("alice@"),
            Err(NodeParseError::MissingDomain(_))
        ));
    }

    #[test]
    fn identity_drops_instance() {
        let node: Node = "alice@example.com/home".parse().unwrap();
        let identity = node.to_identity();
        assert_eq!(identity.to_string(), "alice@example.com");
    }
}
