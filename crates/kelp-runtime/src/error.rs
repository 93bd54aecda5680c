use std::{collections::HashSet, fmt::Display};

use crate::annotation::RcString;

#[derive(thiserror::Error, Clone, PartialEq, Eq, Debug)]
pub enum ParseError {
    /// A rule annotated with `@error` failed.
    #[error("{message} at {position}")]
    Annotated { position: u32, message: RcString },
    #[error("Unexpected input at {position}")]
    UnexpectedInput { position: u32 },
    #[error("No nodes were created")]
    NoNodesCreated,
}

impl ParseError {
    pub fn position(&self) -> Option<u32> {
        match self {
            ParseError::Annotated { position, .. } | ParseError::UnexpectedInput { position } => {
                Some(*position)
            }
            ParseError::NoNodesCreated => None,
        }
    }
}

/// Every error recorded while parsing, in the order they occurred.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct ParseErrors(pub Vec<ParseError>);

impl ParseErrors {
    pub fn iter(&self) -> std::slice::Iter<'_, ParseError> {
        self.0.iter()
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for ParseErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseErrors {}

impl<'a> IntoIterator for &'a ParseErrors {
    type Item = &'a ParseError;
    type IntoIter = std::slice::Iter<'a, ParseError>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Collects annotated errors, reporting each position and message pair once no matter how many
/// times backtracking revisits it.
#[derive(Default)]
pub struct ErrorLog {
    errors: Vec<ParseError>,
    reported: HashSet<(u32, RcString)>,
}

impl ErrorLog {
    pub fn report(&mut self, position: u32, message: &RcString) {
        if self.reported.insert((position, message.clone())) {
            log::trace!("Recorded error {message:?} at {position}");
            self.errors.push(ParseError::Annotated {
                position,
                message: message.clone(),
            });
        }
    }
    pub fn push(&mut self, error: ParseError) {
        self.errors.push(error);
    }
    pub fn errors(&self) -> &[ParseError] {
        &self.errors
    }
    pub fn clear(&mut self) {
        self.errors.clear();
        self.reported.clear();
    }
    pub fn take(&mut self) -> Vec<ParseError> {
        self.reported.clear();
        std::mem::take(&mut self.errors)
    }
}

#[test]
fn test_dedup() {
    let mut log = ErrorLog::default();
    let message: RcString = "expected digit".into();
    log.report(3, &message);
    log.report(3, &message);
    log.report(4, &message);
    assert_eq!(log.errors().len(), 2);
    assert_eq!(
        log.errors()[0].to_string(),
        "expected digit at 3".to_string()
    );
}
