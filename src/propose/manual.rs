use super::{Segment, SegmentProposer};
use crate::error::ProposerError;

pub const MANUAL_REASON: &str = "Manual selection";

/// Segments given up front as `START:END:HEADLINE`, times in seconds.
pub struct ManualProposer {
    segments: Vec<Segment>,
}

impl ManualProposer {
    pub fn parse<S: AsRef<str>>(specs: &[S]) -> Result<Self, ProposerError> {
        let segments = specs
            .iter()
            .map(|s| parse_spec(s.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { segments })
    }
}

impl SegmentProposer for ManualProposer {
    fn name(&self) -> &str {
        "manual"
    }

    fn propose(&self, _transcript: &str) -> Result<Vec<Segment>, ProposerError> {
        Ok(self.segments.clone())
    }
}

fn parse_spec(spec: &str) -> Result<Segment, ProposerError> {
    let invalid = || ProposerError::InvalidSpec(spec.to_string());
    let mut parts = spec.splitn(3, ':');
    let start: f64 = parts
        .next()
        .and_then(|p| p.trim().parse().ok())
        .ok_or_else(invalid)?;
    let end: f64 = parts
        .next()
        .and_then(|p| p.trim().parse().ok())
        .ok_or_else(invalid)?;
    // Headline keeps any further colons
    let headline = parts.next().map(str::trim).unwrap_or_default();
    if headline.is_empty() {
        return Err(invalid());
    }
    Ok(Segment::new(start, end, headline, MANUAL_REASON))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_specs() {
        let proposer = ManualProposer::parse(&["100:150:A", "500.5:545:WAIT: WHAT?"]).unwrap();
        let segments = proposer.propose("").unwrap();
        assert_eq!(segments[0], Segment::new(100.0, 150.0, "A", MANUAL_REASON));
        assert_eq!(segments[1].start_time, 500.5);
        assert_eq!(segments[1].headline, "WAIT: WHAT?");
    }

    #[test]
    fn rejects_malformed_specs() {
        for bad in ["100", "100:150", "a:150:X", "100:b:X", "100:150:  "] {
            assert!(
                matches!(ManualProposer::parse(&[bad]), Err(ProposerError::InvalidSpec(_))),
                "{}",
                bad
            );
        }
    }
}
