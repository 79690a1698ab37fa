//! Declarative facts in the design oracle's input language
//!
//! Facts are plain strings of the form `entity(kind,parent,id).` or
//! `attribute(name,id,value).`, terminated by a period.

use crate::dataset::Dataset;
use crate::schema::{DataType, SchemaSummary};
use serde::{Deserialize, Serialize};

/// Ordered, immutable facts describing a dataset
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaFacts(Vec<String>);

impl SchemaFacts {
    /// Derive facts from a schema summary
    #[must_use]
    pub fn from_summary(summary: &SchemaSummary) -> Self {
        let mut facts = vec![attribute("number_rows", "root", summary.number_rows)];

        for (i, field) in summary.fields.iter().enumerate() {
            let id = format!("f{i}");
            facts.push(entity("field", "root", &id));
            facts.push(attribute("(field,name)", &id, atom(&field.name)));
            facts.push(attribute("(field,type)", &id, field.data_type.as_str()));
            facts.push(attribute("(field,unique)", &id, field.unique));

            if field.data_type == DataType::Number {
                if let (Some(min), Some(max)) = (field.min, field.max) {
                    facts.push(attribute("(field,min)", &id, to_int(min.floor())));
                    facts.push(attribute("(field,max)", &id, to_int(max.ceil())));
                }
            }
        }

        Self(facts)
    }

    /// Facts in order
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Number of facts
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no facts
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl IntoIterator for SchemaFacts {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Summarize a dataset and derive its facts
#[must_use]
pub fn build(dataset: &Dataset) -> (SchemaSummary, SchemaFacts) {
    let summary = SchemaSummary::infer(dataset);
    let facts = SchemaFacts::from_summary(&summary);
    (summary, facts)
}

/// `entity(kind,parent,id).`
#[must_use]
pub fn entity(kind: &str, parent: &str, id: &str) -> String {
    format!("entity({kind},{parent},{id}).")
}

/// `attribute(name,id,value).`
#[must_use]
pub fn attribute(name: &str, id: &str, value: impl std::fmt::Display) -> String {
    format!("attribute({name},{id},{value}).")
}

/// Render a name as a bare atom when legal, quoted otherwise
#[must_use]
pub fn atom(name: &str) -> String {
    let mut chars = name.chars();
    let bare = chars.next().is_some_and(|c| c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if bare {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('\\', "\\\\").replace('"', "\\\""))
    }
}

#[allow(clippy::cast_possible_truncation)]
fn to_int(x: f64) -> i64 {
    x as i64
}
