//! `+++`-delimited TOML front matter.
//!
//! Content and layout files may open with a block like:
//!
//! ```text
//! +++
//! title = "About"
//! layout = "base.html"
//! +++
//! # About me
//! ```
//!
//! Fences are whole lines, so CRLF files and a closing fence on the last
//! line without a newline both work.
//!
//! `layout` names a file relative to the configured layout path. Other keys
//! are kept in [`FrontMatter::extra`] and ignored by the pipeline.

use serde::Deserialize;

const FENCE: &str = "+++";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FrontMatter {
    pub title: Option<String>,
    pub layout: Option<String>,
    #[serde(flatten)]
    pub extra: toml::Table,
}

/// Split a document into its front matter and body.
///
/// Documents without a (closed) front matter block are returned whole with
/// empty front matter.
pub fn split(input: &str) -> Result<(FrontMatter, &str), toml::de::Error> {
    let Some(rest) = after_opening_fence(input) else {
        return Ok((FrontMatter::default(), input));
    };
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end_matches(['\r', '\n']) == FENCE {
            let front = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return Ok((toml::from_str(front)?, body));
        }
        offset += line.len();
    }
    Ok((FrontMatter::default(), input))
}

fn after_opening_fence(input: &str) -> Option<&str> {
    let rest = input.strip_prefix(FENCE)?;
    rest.strip_prefix('\n').or_else(|| rest.strip_prefix("\r\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_title_and_layout() {
        let (front, body) = split("+++\ntitle = \"About\"\nlayout = \"base.html\"\n+++\n# Hi\n").unwrap();
        assert_eq!(front.title.as_deref(), Some("About"));
        assert_eq!(front.layout.as_deref(), Some("base.html"));
        assert_eq!(body, "# Hi\n");
    }

    #[test]
    fn keeps_unknown_keys() {
        let (front, _) = split("+++\ndate = \"2024-01-01\"\n+++\nbody").unwrap();
        assert_eq!(
            front.extra.get("date").and_then(|v| v.as_str()),
            Some("2024-01-01")
        );
    }

    #[test]
    fn no_front_matter_returns_input() {
        let (front, body) = split("# Plain\n").unwrap();
        assert_eq!(front, FrontMatter::default());
        assert_eq!(body, "# Plain\n");
    }

    #[test]
    fn unclosed_block_is_body() {
        let input = "+++\ntitle = \"x\"\nno closing fence";
        let (front, body) = split(input).unwrap();
        assert_eq!(front, FrontMatter::default());
        assert_eq!(body, input);
    }

    #[test]
    fn empty_block() {
        let (front, body) = split("+++\n+++\nbody").unwrap();
        assert_eq!(front, FrontMatter::default());
        assert_eq!(body, "body");
    }

    #[test]
    fn closing_fence_at_end_of_file() {
        let (front, body) = split("+++\nlayout = \"base.html\"\n+++").unwrap();
        assert_eq!(front.layout.as_deref(), Some("base.html"));
        assert_eq!(body, "");
    }

    #[test]
    fn crlf_line_endings() {
        let (front, body) =
            split("+++\r\ntitle = \"Win\"\r\nlayout = \"base.html\"\r\n+++\r\n# Hi\r\n").unwrap();
        assert_eq!(front.title.as_deref(), Some("Win"));
        assert_eq!(front.layout.as_deref(), Some("base.html"));
        assert_eq!(body, "# Hi\r\n");
    }

    #[test]
    fn fence_must_be_a_whole_line() {
        let input = "+++\ntitle = \"x\"\n+++ not a fence\n";
        let (front, body) = split(input).unwrap();
        assert_eq!(front, FrontMatter::default());
        assert_eq!(body, input);
    }

    #[test]
    fn invalid_toml_is_error() {
        assert!(split("+++\ntitle = \n+++\nbody").is_err());
    }
}
