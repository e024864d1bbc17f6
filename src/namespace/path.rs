//! Dotted path expressions: `a.b[0].c`.

use crate::error::NodeError;

/// One segment of a parsed path expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSeg {
    Key(String),
    Index(usize),
}

/// Parse a dotted path with optional bracketed indices. An empty path or a
/// malformed bracket is reported as [`NodeError::PathNotFound`] carrying the
/// original expression.
pub fn parse_path(path: &str) -> Result<Vec<PathSeg>, NodeError> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(NodeError::PathNotFound(path.to_string()));
    }

    let mut segs = Vec::new();
    for part in trimmed.split('.') {
        if part.is_empty() {
            return Err(NodeError::PathNotFound(path.to_string()));
        }
        let mut rest = part;
        let key_end = rest.find('[').unwrap_or(rest.len());
        let key = &rest[..key_end];
        if !key.is_empty() {
            segs.push(PathSeg::Key(key.to_string()));
        } else if key_end == 0 && segs.is_empty() {
            // A path cannot open with a bare index.
            return Err(NodeError::PathNotFound(path.to_string()));
        }
        rest = &rest[key_end..];
        while let Some(stripped) = rest.strip_prefix('[') {
            let close = stripped
                .find(']')
                .ok_or_else(|| NodeError::PathNotFound(path.to_string()))?;
            let index: usize = stripped[..close]
                .parse()
                .map_err(|_| NodeError::PathNotFound(path.to_string()))?;
            segs.push(PathSeg::Index(index));
            rest = &stripped[close + 1..];
        }
        if !rest.is_empty() {
            return Err(NodeError::PathNotFound(path.to_string()));
        }
    }

    Ok(segs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_path() {
        assert_eq!(
            parse_path("a.b.c").unwrap(),
            vec![
                PathSeg::Key("a".into()),
                PathSeg::Key("b".into()),
                PathSeg::Key("c".into())
            ]
        );
    }

    #[test]
    fn test_indexed_path() {
        assert_eq!(
            parse_path("a.b[0].c").unwrap(),
            vec![
                PathSeg::Key("a".into()),
                PathSeg::Key("b".into()),
                PathSeg::Index(0),
                PathSeg::Key("c".into())
            ]
        );
    }

    #[test]
    fn test_double_index() {
        assert_eq!(
            parse_path("m[1][2]").unwrap(),
            vec![
                PathSeg::Key("m".into()),
                PathSeg::Index(1),
                PathSeg::Index(2)
            ]
        );
    }

    #[test]
    fn test_malformed_paths() {
        for bad in ["", ".", "a..b", "a[", "a[x]", "a[1", "a]1["] {
            assert!(parse_path(bad).is_err(), "expected error for {bad:?}");
        }
    }

    #[test]
    fn test_whitespace_trimmed() {
        assert_eq!(
            parse_path("  a.b  ").unwrap(),
            vec![PathSeg::Key("a".into()), PathSeg::Key("b".into())]
        );
    }
}
