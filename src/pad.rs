//! Pad naming.
//!
//! A pad is a named port on an element. Its full name has the form
//! `<element>:<dir>:<short>`, where `<dir>` is `src` for source (output)
//! pads and `snk` for sink (input) pads. Full names are how pads are
//! addressed when linking, so the components may not be empty or contain
//! `:`.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Direction of a pad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PadDirection {
    /// An output pad; frames are produced here.
    Source,
    /// An input pad; frames are delivered here.
    Sink,
}

impl PadDirection {
    /// The tag used in full pad names.
    pub fn tag(&self) -> &'static str {
        match self {
            PadDirection::Source => "src",
            PadDirection::Sink => "snk",
        }
    }
}

impl fmt::Display for PadDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// The full name of a pad: owning element, direction, and short name.
///
/// ```rust
/// use millrace::pad::{PadDirection, PadName};
///
/// let pad = PadName::src("count", "out");
/// assert_eq!(pad.to_string(), "count:src:out");
/// assert_eq!("count:src:out".parse::<PadName>().unwrap(), pad);
/// assert_eq!(pad.direction(), PadDirection::Source);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PadName {
    element: String,
    direction: PadDirection,
    short: String,
}

impl PadName {
    /// Name a source pad on `element`.
    pub fn src(element: impl Into<String>, short: impl Into<String>) -> Self {
        Self {
            element: element.into(),
            direction: PadDirection::Source,
            short: short.into(),
        }
    }

    /// Name a sink pad on `element`.
    pub fn snk(element: impl Into<String>, short: impl Into<String>) -> Self {
        Self {
            element: element.into(),
            direction: PadDirection::Sink,
            short: short.into(),
        }
    }

    /// The owning element's name.
    pub fn element(&self) -> &str {
        &self.element
    }

    /// The pad's direction.
    pub fn direction(&self) -> PadDirection {
        self.direction
    }

    /// The short name, unique within one element and direction.
    pub fn short(&self) -> &str {
        &self.short
    }

    /// Parse a full pad name.
    pub fn parse(s: &str) -> Result<Self> {
        let mut parts = s.split(':');
        let (element, dir, short) = match (parts.next(), parts.next(), parts.next(), parts.next())
        {
            (Some(element), Some(dir), Some(short), None) => (element, dir, short),
            _ => return Err(Error::MalformedPadName(s.to_string())),
        };
        if element.is_empty() || short.is_empty() {
            return Err(Error::MalformedPadName(s.to_string()));
        }
        let direction = match dir {
            "src" => PadDirection::Source,
            "snk" => PadDirection::Sink,
            _ => return Err(Error::MalformedPadName(s.to_string())),
        };
        Ok(Self {
            element: element.to_string(),
            direction,
            short: short.to_string(),
        })
    }
}

impl fmt::Display for PadName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.element, self.direction, self.short)
    }
}

impl FromStr for PadName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_round_trip() {
        let src = PadName::src("double", "out");
        assert_eq!(src.to_string(), "double:src:out");
        assert_eq!(PadName::parse("double:src:out").unwrap(), src);

        let snk = PadName::snk("double", "in");
        assert_eq!(snk.to_string(), "double:snk:in");
        assert_eq!("double:snk:in".parse::<PadName>().unwrap(), snk);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in [
            "",
            "noparts",
            "a:src",
            "a:src:b:c",
            "a:sideways:b",
            ":src:b",
            "a:src:",
        ] {
            assert!(
                matches!(PadName::parse(bad), Err(Error::MalformedPadName(_))),
                "accepted {bad:?}"
            );
        }
    }
}
