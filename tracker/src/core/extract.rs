//! Decision extraction from free-form completion text.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::types::{Decision, Operator};

static BOLD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*([^*]+)\*\*").expect("bold pattern is valid"));
static ITALIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*([^*]+)\*").expect("italic pattern is valid"));

const QUOTE_CHARS: [char; 6] = ['"', '\'', '\u{201C}', '\u{201D}', '\u{2018}', '\u{2019}'];

/// Operator and target found in a response; either may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub operator: Option<Operator>,
    pub target: Option<String>,
}

impl Extraction {
    /// The full decision, only when both halves were found.
    pub fn decision(&self) -> Option<Decision> {
        match (self.operator, &self.target) {
            (Some(operator), Some(target)) => Some(Decision {
                operator,
                target: target.clone(),
            }),
            _ => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.operator.is_some() && self.target.is_some()
    }
}

/// Extract an operator and a target from `response`.
///
/// Strengthen wins when both keywords appear. The target is the first entry
/// of `valid_targets`, in the order given, that occurs anywhere in the
/// normalized text (case-insensitive), regardless of where in the text it
/// appears.
pub fn extract(response: &str, valid_targets: &[String]) -> Extraction {
    let text = normalize(response);

    let operator = Operator::ALL.into_iter().find(|operator| {
        text.contains(operator.keyword()) || text.contains(operator.symbols())
    });

    let target = valid_targets
        .iter()
        .find(|candidate| text.contains(&candidate.to_lowercase()))
        .cloned();

    Extraction { operator, target }
}

/// Lower-case, unwrap `**…**` and `*…*` emphasis, and drop quote characters.
fn normalize(response: &str) -> String {
    let lowered = response.to_lowercase();
    let unbolded = BOLD_RE.replace_all(&lowered, "$1");
    let plain = ITALIC_RE.replace_all(&unbolded, "$1");
    plain.replace(QUOTE_CHARS, "")
}
