//! # Resource Query Facility
//!
//! Property-predicate lookups over the resource catalog. Results stream
//! lazily and are terminated by an explicit [`QueryEvent::End`] marker, so a
//! consumer can tell "no more results" apart from a stream that was cut off.

use crate::models::ComputeResource;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("Query failed: {reason}")]
    Failed { reason: String },

    #[error("Query stream ended without an end marker")]
    Incomplete,
}

/// Field a predicate term is evaluated against
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum PropertyPath {
    SelfLink,
    CustomProperty(String),
}

impl PropertyPath {
    fn resolve<'a>(&self, document: &'a ComputeResource) -> Option<&'a str> {
        match self {
            Self::SelfLink => Some(document.self_link.as_str()),
            Self::CustomProperty(name) => document.property(name),
        }
    }
}

/// Composable query predicate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Predicate {
    Eq { field: PropertyPath, value: String },
    In { field: PropertyPath, values: BTreeSet<String> },
    And { terms: Vec<Predicate> },
}

impl Predicate {
    pub fn property_eq(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Eq {
            field: PropertyPath::CustomProperty(name.into()),
            value: value.into(),
        }
    }

    /// Membership test on the document self link
    pub fn self_link_in<I, S>(links: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::In {
            field: PropertyPath::SelfLink,
            values: links.into_iter().map(Into::into).collect(),
        }
    }

    pub fn and(self, other: Predicate) -> Self {
        match self {
            Self::And { mut terms } => {
                terms.push(other);
                Self::And { terms }
            }
            first => Self::And {
                terms: vec![first, other],
            },
        }
    }

    pub fn matches(&self, document: &ComputeResource) -> bool {
        match self {
            Self::Eq { field, value } => field.resolve(document) == Some(value.as_str()),
            Self::In { field, values } => field
                .resolve(document)
                .is_some_and(|found| values.contains(found)),
            Self::And { terms } => terms.iter().all(|term| term.matches(document)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Compute,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceQuerySpec {
    pub kind: DocumentKind,
    pub predicate: Predicate,
    /// Return full documents rather than links only
    pub expand: bool,
}

impl ResourceQuerySpec {
    pub fn compute(predicate: Predicate) -> Self {
        Self {
            kind: DocumentKind::Compute,
            predicate,
            expand: false,
        }
    }

    pub fn expanded(mut self) -> Self {
        self.expand = true;
        self
    }
}

/// One item of a query result stream
#[derive(Debug, Clone, PartialEq)]
pub enum QueryEvent {
    Document(ComputeResource),
    Failure(QueryError),
    End,
}

pub type QueryStream = BoxStream<'static, QueryEvent>;

#[async_trait]
pub trait ResourceQuery: Send + Sync {
    async fn query(&self, spec: ResourceQuerySpec) -> QueryStream;
}

/// Drain a result stream up to its end marker
pub async fn collect_documents(mut stream: QueryStream) -> Result<Vec<ComputeResource>, QueryError> {
    let mut documents = Vec::new();
    while let Some(event) = stream.next().await {
        match event {
            QueryEvent::Document(document) => documents.push(document),
            QueryEvent::Failure(err) => return Err(err),
            QueryEvent::End => return Ok(documents),
        }
    }
    Err(QueryError::Incomplete)
}
