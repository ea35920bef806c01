//! Positional string formatting for the `format` parameter source.
//!
//! The verbs `%s`, `%v` and `%d` each consume the next argument, `%%` is a
//! literal percent sign. Strings are substituted as-is, all other values as
//! compact JSON.
use serde_json::Value;
use snafu::{Snafu, ensure};

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum Error {
    #[snafu(display("unsupported format verb %{verb} at offset {offset}"))]
    UnsupportedVerb { verb: char, offset: usize },

    #[snafu(display("format string ends with a lone %"))]
    TrailingPercent,

    #[snafu(display("format string has {verbs} verbs but {arguments} arguments were given"))]
    ArgumentCount { verbs: usize, arguments: usize },
}

enum Piece<'a> {
    Literal(&'a str),
    Argument,
}

fn pieces(format: &str) -> Result<Vec<Piece<'_>>, Error> {
    let mut pieces = Vec::new();
    let mut literal_start = 0;
    let mut chars = format.char_indices();

    while let Some((offset, chr)) = chars.next() {
        if chr != '%' {
            continue;
        }

        pieces.push(Piece::Literal(&format[literal_start..offset]));
        match chars.next() {
            Some((_, '%')) => pieces.push(Piece::Literal("%")),
            Some((_, 's' | 'v' | 'd')) => pieces.push(Piece::Argument),
            Some((_, verb)) => return UnsupportedVerbSnafu { verb, offset }.fail(),
            None => return TrailingPercentSnafu.fail(),
        }
        literal_start = offset + 2;
    }

    pieces.push(Piece::Literal(&format[literal_start..]));
    Ok(pieces)
}

/// Returns the number of arguments `format` consumes.
pub fn count_verbs(format: &str) -> Result<usize, Error> {
    Ok(pieces(format)?
        .iter()
        .filter(|piece| matches!(piece, Piece::Argument))
        .count())
}

/// Substitutes `arguments` into `format` positionally.
pub fn format(format: &str, arguments: &[Value]) -> Result<String, Error> {
    let pieces = pieces(format)?;
    let verbs = pieces
        .iter()
        .filter(|piece| matches!(piece, Piece::Argument))
        .count();
    ensure!(
        verbs == arguments.len(),
        ArgumentCountSnafu {
            verbs,
            arguments: arguments.len(),
        }
    );

    let mut arguments = arguments.iter();
    let mut output = String::with_capacity(format.len());
    for piece in pieces {
        match piece {
            Piece::Literal(literal) => output.push_str(literal),
            Piece::Argument => match arguments.next() {
                Some(Value::String(value)) => output.push_str(value),
                Some(value) => output.push_str(&value.to_string()),
                None => {}
            },
        }
    }

    Ok(output)
}
