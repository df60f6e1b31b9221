//! Typed render boundary
//!
//! The VM does not draw anything. Executing a page produces an ordered
//! stream of [`RenderOp`] records that an external renderer consumes;
//! this module is the complete contract between the two sides.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Page element kinds, with their stable wire ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderTag {
    /// Generic grouping element
    Container = 1,
    /// Text paragraph
    Paragraph = 2,
    /// Heading
    Heading = 3,
    /// Tabular data
    Table = 4,
    /// Image
    Image = 5,
    /// Card
    Card = 6,
    /// Layout region
    Layout = 7,
}

impl RenderTag {
    /// Stable numeric id carried in the quadruple stream
    pub fn id(self) -> i32 {
        self as i32
    }

    /// Reverse of [`RenderTag::id`]
    pub fn from_id(id: i32) -> Option<RenderTag> {
        match id {
            1 => Some(RenderTag::Container),
            2 => Some(RenderTag::Paragraph),
            3 => Some(RenderTag::Heading),
            4 => Some(RenderTag::Table),
            5 => Some(RenderTag::Image),
            6 => Some(RenderTag::Card),
            7 => Some(RenderTag::Layout),
            _ => None,
        }
    }

    /// Source keyword for this tag
    pub fn keyword(self) -> &'static str {
        match self {
            RenderTag::Container => "container",
            RenderTag::Paragraph => "paragraph",
            RenderTag::Heading => "heading",
            RenderTag::Table => "table",
            RenderTag::Image => "image",
            RenderTag::Card => "card",
            RenderTag::Layout => "layout",
        }
    }
}

impl fmt::Display for RenderTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.keyword())
    }
}

/// A value attached to a render operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderValue {
    /// Integer attribute value
    Int(i64),
    /// Float attribute value
    Float(f64),
    /// String attribute value
    Str(String),
    /// Boolean attribute value
    Bool(bool),
}

/// One operation in the render stream
///
/// An op with no `attribute` opens the element itself; ops carrying an
/// `attribute` set one named attribute of the most recently opened
/// element of that tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderOp {
    /// Element kind
    pub tag: RenderTag,
    /// Attribute value, absent for element-open ops
    pub value: Option<RenderValue>,
    /// Attribute name, absent for element-open ops
    pub attribute: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_id_roundtrip() {
        for tag in [
            RenderTag::Container,
            RenderTag::Paragraph,
            RenderTag::Heading,
            RenderTag::Table,
            RenderTag::Image,
            RenderTag::Card,
            RenderTag::Layout,
        ] {
            assert_eq!(RenderTag::from_id(tag.id()), Some(tag));
        }
        assert_eq!(RenderTag::from_id(0), None);
        assert_eq!(RenderTag::from_id(8), None);
    }
}
