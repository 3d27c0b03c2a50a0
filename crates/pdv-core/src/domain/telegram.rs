//! Heuristic telegram classification.
//!
//! PDV telegrams are free text with no formal grammar.  The gateway only
//! needs to know where a sale starts, where it ends, and whether the cashier
//! is still doing something in between, so it relies on a handful of marker
//! substrings (all case-sensitive):
//!
//! | Kind       | Rule                                                  |
//! |------------|-------------------------------------------------------|
//! | `Start`    | contains `*PDV`, `*Trans:` **and** `*Atend:`          |
//! | `End`      | contains `TOTAL` **and** `R$`, **or** `Pagamento`     |
//! | `Activity` | a run of 8-13 digits (a barcode), `Produto` or `Item` |
//!
//! Rules are tested in that order; the first match wins.
//!
//! The classifier is a heuristic.  A telegram that merely mentions `TOTAL`
//! and `R$` mid-sale is read as the end of the sale; that imprecision is
//! accepted.  Classification never fails: anything unrecognised is
//! [`TelegramKind::Other`].

use regex::Regex;

/// Marker substrings that must all be present in a transaction-start telegram.
pub const START_MARKERS: [&str; 3] = ["*PDV", "*Trans:", "*Atend:"];

/// What a single telegram says about the state of a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TelegramKind {
    /// A new sale was opened.
    Start,
    /// The sale was totalled or paid.
    End,
    /// Something happened inside a sale (item scanned, product line).
    Activity,
    /// Anything else.
    Other,
}

/// Pluggable telegram classifier.
///
/// The transaction monitor is generic over this trait so deployments with a
/// different PDV vendor can swap in their own rules.
pub trait TelegramClassifier: Send + Sync {
    /// Classifies one telegram.  Must not panic on arbitrary input.
    fn classify(&self, telegram: &str) -> TelegramKind;
}

/// The default marker-substring classifier.
#[derive(Debug, Clone)]
pub struct MarkerClassifier {
    product_code: Regex,
}

impl MarkerClassifier {
    pub fn new() -> Self {
        Self {
            // The pattern is a compile-time constant; it cannot fail to compile.
            product_code: Regex::new(r"\d{8,13}").unwrap(),
        }
    }

    pub fn is_start(&self, telegram: &str) -> bool {
        START_MARKERS.iter().all(|m| telegram.contains(m))
    }

    pub fn is_end(&self, telegram: &str) -> bool {
        (telegram.contains("TOTAL") && telegram.contains("R$")) || telegram.contains("Pagamento")
    }

    pub fn is_activity(&self, telegram: &str) -> bool {
        self.product_code.is_match(telegram)
            || telegram.contains("Produto")
            || telegram.contains("Item")
    }
}

impl Default for MarkerClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl TelegramClassifier for MarkerClassifier {
    fn classify(&self, telegram: &str) -> TelegramKind {
        if self.is_start(telegram) {
            TelegramKind::Start
        } else if self.is_end(telegram) {
            TelegramKind::End
        } else if self.is_activity(telegram) {
            TelegramKind::Activity
        } else {
            TelegramKind::Other
        }
    }
}
