//! Handling of the `chooseStock` script fragment.
//!
//! A selection function assigns the traded instruments to `context.symbol_list`:
//!
//! ```text
//! def choose_stock(context):
//!     context.symbol_list = ["600000.XSHG", "000001.XSHE"]
//! ```

use crate::error::StrategyError;
use core_types::Instrument;
use regex_lite::Regex;
use std::sync::LazyLock;

/// Function signatures recognised as a complete selection function.
pub const SELECTION_SIGNATURES: [&str; 2] = ["def choose_stock(", "def chooseStock("];

static SYMBOL_LIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"symbol_list\s*=\s*\[([^\]]*)\]").expect("symbol list pattern is valid")
});

static QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"["']([^"']*)["']"#).expect("quoted token pattern is valid"));

static BENCHMARK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"benchmark\s*=\s*["']([^"']*)["']"#).expect("benchmark pattern is valid")
});

/// True when `code` is a complete selection function rather than a bare list.
pub fn is_selection_function(code: &str) -> bool {
    let code = code.trim_start();
    SELECTION_SIGNATURES.iter().any(|sig| code.starts_with(sig))
}

/// Compiles a bare `&`-delimited list such as `600000.XSHG&000001.XSHE` into
/// the canonical selection function.
pub fn compile_symbol_list(list: &str) -> String {
    let quoted: Vec<String> = list
        .split('&')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{t}\""))
        .collect();
    format!(
        "def choose_stock(context):\n    context.symbol_list = [{}]\n",
        quoted.join(", ")
    )
}

/// Returns the selection function for a `chooseStock` override: complete
/// functions are kept verbatim, anything else is compiled as a bare list.
pub fn normalize(choose_stock: &str) -> String {
    if is_selection_function(choose_stock) {
        choose_stock.to_string()
    } else {
        compile_symbol_list(choose_stock)
    }
}

/// Extracts the instruments assigned to `symbol_list`.
///
/// Fails when there is no assignment, when the list holds no quoted tokens,
/// or when no token parses as `SYMBOL.EXCHANGE`. Individual bad tokens among
/// good ones are skipped with a warning.
pub fn extract_instruments(code: &str) -> Result<Vec<Instrument>, StrategyError> {
    let captures = SYMBOL_LIST.captures(code).ok_or_else(|| {
        StrategyError::Extraction("no `symbol_list = [...]` assignment found".to_string())
    })?;
    let list = captures.get(1).map_or("", |m| m.as_str());

    let tokens: Vec<&str> = QUOTED
        .captures_iter(list)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .filter(|t| !t.is_empty())
        .collect();
    if tokens.is_empty() {
        return Err(StrategyError::Extraction("symbol_list is empty".to_string()));
    }

    let mut instruments: Vec<Instrument> = Vec::with_capacity(tokens.len());
    for token in &tokens {
        match Instrument::parse(token) {
            Some(instrument) if !instruments.contains(&instrument) => instruments.push(instrument),
            Some(_) => {}
            None => {
                tracing::warn!(token, "Skipping symbol_list entry that is not SYMBOL.EXCHANGE.")
            }
        }
    }
    if instruments.is_empty() {
        return Err(StrategyError::Extraction(format!(
            "none of {tokens:?} parse as SYMBOL.EXCHANGE"
        )));
    }

    Ok(instruments)
}

/// Finds a `benchmark = "SYMBOL.EXCHANGE"` assignment in any of `fragments`.
///
/// `Ok(None)` when none of them set a benchmark; an error when one is set but
/// does not parse.
pub fn find_benchmark(fragments: &[&str]) -> Result<Option<Instrument>, StrategyError> {
    for fragment in fragments {
        if let Some(captures) = BENCHMARK.captures(fragment) {
            let token = captures.get(1).map_or("", |m| m.as_str());
            return Instrument::parse(token).map(Some).ok_or_else(|| {
                StrategyError::MalformedStrategy(format!(
                    "benchmark '{token}' is not SYMBOL.EXCHANGE"
                ))
            });
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_list_compiles_to_canonical_function() {
        let code = normalize("600000.XSHG & 000001.XSHE&");
        assert!(is_selection_function(&code));
        assert_eq!(
            extract_instruments(&code).unwrap(),
            vec![Instrument::new("600000", "XSHG"), Instrument::new("000001", "XSHE")]
        );
    }

    #[test]
    fn complete_function_is_used_verbatim() {
        let code =
            "def choose_stock(context):\n    context.symbol_list = ['510300.XSHG']\n    return\n";
        assert_eq!(normalize(code), code);
        assert_eq!(extract_instruments(code).unwrap(), vec![Instrument::new("510300", "XSHG")]);
    }

    #[test]
    fn missing_assignment_is_an_error() {
        let err = extract_instruments("def choose_stock(context):\n    pass\n").unwrap_err();
        assert!(matches!(err, StrategyError::Extraction(_)));
    }

    #[test]
    fn empty_list_is_an_error() {
        let err = extract_instruments("context.symbol_list = []").unwrap_err();
        assert!(matches!(err, StrategyError::Extraction(msg) if msg.contains("empty")));
    }

    #[test]
    fn unparseable_tokens_are_an_error() {
        let err = extract_instruments(r#"context.symbol_list = ["600000", "XSHG"]"#).unwrap_err();
        assert!(matches!(err, StrategyError::Extraction(msg) if msg.contains("SYMBOL.EXCHANGE")));
    }

    #[test]
    fn partially_bad_lists_keep_good_tokens() {
        let code = r#"context.symbol_list = ["600000.XSHG", "oops", "600000.XSHG"]"#;
        assert_eq!(extract_instruments(code).unwrap(), vec![Instrument::new("600000", "XSHG")]);
    }

    #[test]
    fn benchmark_is_read_from_first_fragment_that_sets_it() {
        let found = find_benchmark(&["x = 1", "context.benchmark = '000300.XSHG'"]).unwrap();
        assert_eq!(found, Some(Instrument::new("000300", "XSHG")));
        assert_eq!(find_benchmark(&["", "nothing"]).unwrap(), None);
        assert!(find_benchmark(&["benchmark = 'hs300'"]).is_err());
    }
}
