//! Small helpers shared by the publish and import pipelines
use uuid::Uuid;

/// Generates a fresh id for a story, passage or command
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generates a fresh interactive fiction id, upper-case as Twine writes them
pub fn new_ifid() -> String {
    Uuid::new_v4().to_string().to_uppercase()
}

/// Formats a coordinate pair as `a,b`
pub fn format_pair(a: f64, b: f64) -> String {
    format!("{},{}", a, b)
}

/// Parses an `a,b` coordinate pair. Both parts must be finite
pub fn parse_pair(s: &str) -> Option<(f64, f64)> {
    fn part(s: Option<&str>) -> Option<f64> {
        s?.trim().parse::<f64>().ok().filter(|v| v.is_finite())
    }
    let mut iter = s.split(',');
    let a = part(iter.next())?;
    let b = part(iter.next())?;
    if iter.next().is_some() {
        return None;
    }
    Some((a, b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs() {
        assert_eq!(format_pair(100., 25.5), "100,25.5");
        assert_eq!(parse_pair("100,25.5"), Some((100., 25.5)));
        assert_eq!(parse_pair(" 3 , 4 "), Some((3., 4.)));
        assert_eq!(parse_pair("3"), None);
        assert_eq!(parse_pair("3,4,5"), None);
        assert_eq!(parse_pair("a,b"), None);
    }

    #[test]
    fn pairs_must_be_finite() {
        assert_eq!(parse_pair("NaN,1"), None);
        assert_eq!(parse_pair("inf,2"), None);
        assert_eq!(parse_pair("1,-inf"), None);
        assert_eq!(parse_pair("1e400,0"), None);
        assert_eq!(parse_pair("-0,1e300"), Some((0., 1e300)));
    }

    #[test]
    fn ifid_is_upper_case() {
        let ifid = new_ifid();
        assert_eq!(ifid, ifid.to_uppercase());
        assert_eq!(ifid.len(), 36);
    }
}
