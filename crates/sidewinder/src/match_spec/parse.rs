use thiserror::Error;

use super::{Constraint, MatchSpec};
use crate::version_spec::ParseVersionSpecError;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseMatchSpecError {
    #[error("invalid match spec '{0}': expected 1 to 3 whitespace-separated fields")]
    WrongNumberOfFields(String),
    #[error("invalid match spec '{0}': unterminated option list")]
    UnterminatedOptions(String),
    #[error("invalid match spec '{0}': unknown option '{1}'")]
    UnknownOption(String, String),
    #[error("invalid match spec '{0}': {1}")]
    InvalidVersionSpec(String, ParseVersionSpecError),
}

pub(super) fn parse(input: &str) -> Result<MatchSpec, ParseMatchSpecError> {
    let (main, options) = match input.split_once('(') {
        None => (input, None),
        Some((main, options)) => (main, Some(options)),
    };

    let mut optional = false;
    let mut target = None;
    if let Some(options) = options {
        let body = options
            .trim()
            .strip_suffix(')')
            .ok_or_else(|| ParseMatchSpecError::UnterminatedOptions(input.to_owned()))?;
        for option in body.split(',') {
            let option = option.trim();
            if option == "optional" {
                optional = true;
            } else if let Some(fkey) = option.strip_prefix("target=") {
                target = Some(fkey.trim().to_owned());
            } else {
                return Err(ParseMatchSpecError::UnknownOption(
                    input.to_owned(),
                    option.to_owned(),
                ));
            }
        }
    }

    let fields: Vec<&str> = main.split_whitespace().collect();
    let (name, constraint) = match fields.as_slice() {
        [name] => (*name, Constraint::Name),
        [name, version] => (
            *name,
            Constraint::Version(version.parse().map_err(|err| {
                ParseMatchSpecError::InvalidVersionSpec(input.to_owned(), err)
            })?),
        ),
        [name, version, build] => (
            *name,
            Constraint::Exact {
                version: (*version).to_owned(),
                build: (*build).to_owned(),
            },
        ),
        _ => return Err(ParseMatchSpecError::WrongNumberOfFields(input.to_owned())),
    };

    Ok(MatchSpec {
        spec: fields.join(" "),
        name: name.to_owned(),
        constraint,
        optional,
        target,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn rejects_malformed_specs() {
        assert_matches!(
            parse(""),
            Err(ParseMatchSpecError::WrongNumberOfFields(_))
        );
        assert_matches!(
            parse("a b c d"),
            Err(ParseMatchSpecError::WrongNumberOfFields(_))
        );
        assert_matches!(
            parse("numpy (optional"),
            Err(ParseMatchSpecError::UnterminatedOptions(_))
        );
        assert_matches!(
            parse("numpy (bogus)"),
            Err(ParseMatchSpecError::UnknownOption(_, _))
        );
        assert_matches!(
            parse("numpy >="),
            Err(ParseMatchSpecError::InvalidVersionSpec(_, _))
        );
    }

    #[test]
    fn normalizes_whitespace() {
        let spec = parse("numpy   1.7*").unwrap();
        assert_eq!(spec.spec(), "numpy 1.7*");
    }
}
