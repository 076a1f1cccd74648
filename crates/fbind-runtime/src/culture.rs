#![forbid(unsafe_code)]

//! Culture tokens used by the conversion pipeline.
//!
//! A [`Culture`] is a normalized locale name (`"de-DE"`) or the invariant
//! culture (`""`). It decides the decimal separator used when numbers are
//! parsed from or formatted into strings during automatic coercion.
//!
//! [`CultureContext`] owns the culture bindings fall back to when their
//! configuration names none, with scoped overrides for a subtree of work.

use std::cell::RefCell;
use std::env;
use std::fmt;
use std::rc::Rc;

thread_local! {
    static GLOBAL_CONTEXT: CultureContext = CultureContext::system();
}

/// Languages that write `,` as the decimal separator.
const COMMA_DECIMAL: &[&str] = &[
    "cs", "da", "de", "es", "fi", "fr", "it", "nb", "nl", "pl", "pt", "ru", "sv", "tr", "uk",
];

/// A normalized culture name.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Culture(String);

impl Culture {
    /// Normalize `raw` (`"fr_FR.UTF-8"` becomes `"fr-FR"`). Unusable input
    /// and the `C`/`POSIX` locales map to the invariant culture.
    #[must_use]
    pub fn new(raw: &str) -> Self {
        Self(normalize_culture_raw(raw).unwrap_or_default())
    }

    /// The invariant culture.
    #[must_use]
    pub fn invariant() -> Self {
        Self(String::new())
    }

    /// Culture from `LC_ALL`, then `LANG`.
    #[must_use]
    pub fn from_system() -> Self {
        let lc_all = env::var("LC_ALL").ok();
        let lang = env::var("LANG").ok();
        detect_culture_from(lc_all.as_deref(), lang.as_deref())
    }

    /// The thread's current culture, honoring overrides.
    #[must_use]
    pub fn current() -> Self {
        CultureContext::global().current_culture()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_invariant(&self) -> bool {
        self.0.is_empty()
    }

    /// Language subtag, lowercased (`"de"` for `"de-DE"`).
    #[must_use]
    pub fn language(&self) -> String {
        self.0
            .split('-')
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase()
    }

    #[must_use]
    pub fn decimal_separator(&self) -> char {
        if COMMA_DECIMAL.contains(&self.language().as_str()) {
            ','
        } else {
            '.'
        }
    }

    /// Parse a finite float written in this culture. Group separators are
    /// ignored.
    #[must_use]
    pub fn parse_float(&self, text: &str) -> Option<f64> {
        let text = text.trim();
        let canonical: String = if self.decimal_separator() == ',' {
            text.chars()
                .filter(|c| !matches!(c, '.' | ' ' | '\u{a0}'))
                .map(|c| if c == ',' { '.' } else { c })
                .collect()
        } else {
            text.chars().filter(|c| *c != ',').collect()
        };
        canonical.parse::<f64>().ok().filter(|x| x.is_finite())
    }

    /// Format a float with this culture's decimal separator.
    #[must_use]
    pub fn format_float(&self, value: f64) -> String {
        let text = value.to_string();
        match self.decimal_separator() {
            '.' => text,
            sep => text.replace('.', &sep.to_string()),
        }
    }
}

impl fmt::Debug for Culture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_invariant() {
            f.write_str("Culture(invariant)")
        } else {
            write!(f, "Culture({})", self.0)
        }
    }
}

impl fmt::Display for Culture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Culture {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// Culture provider with scoped overrides.
#[derive(Clone, Debug)]
pub struct CultureContext {
    base: Rc<RefCell<Culture>>,
    overrides: Rc<RefCell<Vec<Culture>>>,
}

impl CultureContext {
    #[must_use]
    pub fn new(culture: impl Into<Culture>) -> Self {
        Self {
            base: Rc::new(RefCell::new(culture.into())),
            overrides: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Context initialized from the environment.
    #[must_use]
    pub fn system() -> Self {
        Self::new(Culture::from_system())
    }

    /// The thread-local context.
    #[must_use]
    pub fn global() -> Self {
        GLOBAL_CONTEXT.with(Clone::clone)
    }

    /// Active culture: the innermost override, else the base.
    #[must_use]
    pub fn current_culture(&self) -> Culture {
        if let Some(culture) = self.overrides.borrow().last() {
            culture.clone()
        } else {
            self.base.borrow().clone()
        }
    }

    #[must_use]
    pub fn base_culture(&self) -> Culture {
        self.base.borrow().clone()
    }

    pub fn set_culture(&self, culture: impl Into<Culture>) {
        *self.base.borrow_mut() = culture.into();
    }

    /// Push a scoped override. Dropping the guard restores the prior culture.
    #[must_use = "dropping this guard clears the culture override"]
    pub fn push_override(&self, culture: impl Into<Culture>) -> CultureOverride {
        let culture = culture.into();
        self.overrides.borrow_mut().push(culture.clone());
        CultureOverride {
            stack: Rc::clone(&self.overrides),
            culture,
        }
    }
}

/// RAII guard for a scoped culture override.
#[must_use = "dropping this guard clears the culture override"]
pub struct CultureOverride {
    stack: Rc<RefCell<Vec<Culture>>>,
    culture: Culture,
}

impl Drop for CultureOverride {
    fn drop(&mut self) {
        let popped = self.stack.borrow_mut().pop();
        if let Some(popped) = popped {
            debug_assert_eq!(popped, self.culture);
        }
    }
}

fn detect_culture_from(lc_all: Option<&str>, lang: Option<&str>) -> Culture {
    lc_all
        .and_then(normalize_culture_raw)
        .or_else(|| lang.and_then(normalize_culture_raw))
        .map_or_else(Culture::invariant, Culture)
}

fn normalize_culture_raw(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let raw = raw.split('@').next().unwrap_or(raw);
    let raw = raw.split('.').next().unwrap_or(raw).trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("c") || raw.eq_ignore_ascii_case("posix") {
        return None;
    }
    Some(raw.replace('_', "-"))
}
