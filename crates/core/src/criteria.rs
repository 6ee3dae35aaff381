//! Query criteria and the stream that normalises raw edits into them.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Structured constraint restricting which records match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterSpec {
	/// Attribute the record must carry.
	pub field: String,
	/// Value the attribute must hold.
	pub value: String,
}

impl FilterSpec {
	pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
		Self {
			field: field.into(),
			value: value.into(),
		}
	}
}

/// Structured constraint restricting where the free text is looked for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeSpec {
	pub field: String,
}

impl ScopeSpec {
	pub fn new(field: impl Into<String>) -> Self {
		Self {
			field: field.into(),
		}
	}
}

/// Pre-classified search constraint, distinct from the free text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Token {
	Filter(FilterSpec),
	Scope(ScopeSpec),
}

impl fmt::Display for Token {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Token::Filter(filter) => write!(f, "{}={}", filter.field, filter.value),
			Token::Scope(scope) => write!(f, "@{}", scope.field),
		}
	}
}

/// How the free text is compared against record text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
	/// The text may appear anywhere.
	#[default]
	Contains,
	/// The text must start a word.
	WordPrefix,
}

/// Fixed matching configuration for a session.
///
/// The default is case-insensitive [`MatchMode::Contains`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
	pub case_sensitive: bool,
	pub match_mode: MatchMode,
}

/// Combined free text, tokens, and options defining one query.
///
/// Values are immutable; every edit produces a new one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchCriteria {
	pub search_term: String,
	#[serde(default)]
	pub tokens: Vec<Token>,
	#[serde(default)]
	pub options: SearchOptions,
}

impl SearchCriteria {
	pub fn new(search_term: impl Into<String>, tokens: Vec<Token>, options: SearchOptions) -> Self {
		Self {
			search_term: search_term.into(),
			tokens,
			options,
		}
	}

	/// Criteria holding only free text and default options.
	pub fn term(search_term: impl Into<String>) -> Self {
		Self::new(search_term, Vec::new(), SearchOptions::default())
	}

	pub fn filters(&self) -> impl Iterator<Item = &FilterSpec> {
		self.tokens.iter().filter_map(|token| match token {
			Token::Filter(filter) => Some(filter),
			Token::Scope(_) => None,
		})
	}

	pub fn scopes(&self) -> impl Iterator<Item = &ScopeSpec> {
		self.tokens.iter().filter_map(|token| match token {
			Token::Scope(scope) => Some(scope),
			Token::Filter(_) => None,
		})
	}
}

/// Normalised `(text, tokens)` pair released by a [`CriteriaStream`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CriteriaChange {
	pub text: String,
	pub tokens: Vec<Token>,
}

/// Turns raw text and token edits into distinct [`CriteriaChange`] values.
///
/// Text is trimmed before comparison. An edit that leaves both the text and
/// the tokens unchanged produces nothing. With a zero debounce interval every
/// distinct change is returned from the edit call itself; otherwise the newest
/// change is held until [`CriteriaStream::poll`] observes that the interval
/// has elapsed since the last edit.
#[derive(Debug, Clone, Default)]
pub struct CriteriaStream {
	text: String,
	tokens: Vec<Token>,
	emitted: CriteriaChange,
	debounce: Duration,
	pending_since: Option<Instant>,
}

impl CriteriaStream {
	#[must_use]
	pub fn new(debounce: Duration) -> Self {
		Self {
			debounce,
			..Self::default()
		}
	}

	/// Text as of the last edit.
	#[must_use]
	pub fn text(&self) -> &str {
		&self.text
	}

	/// Tokens as of the last edit.
	#[must_use]
	pub fn tokens(&self) -> &[Token] {
		&self.tokens
	}

	/// Whether a debounced change is waiting for [`CriteriaStream::poll`].
	#[must_use]
	pub fn has_pending(&self) -> bool {
		self.pending_since.is_some()
	}

	pub fn edit_text(&mut self, raw: &str, now: Instant) -> Option<CriteriaChange> {
		let normalized = raw.trim();
		if normalized == self.text {
			return None;
		}
		self.text = normalized.to_owned();
		self.changed(now)
	}

	pub fn edit_tokens(&mut self, tokens: Vec<Token>, now: Instant) -> Option<CriteriaChange> {
		if tokens == self.tokens {
			return None;
		}
		self.tokens = tokens;
		self.changed(now)
	}

	/// Apply a text and a token edit as one change.
	pub fn edit(&mut self, raw: &str, tokens: Vec<Token>, now: Instant) -> Option<CriteriaChange> {
		let normalized = raw.trim();
		if normalized == self.text && tokens == self.tokens {
			return None;
		}
		self.text = normalized.to_owned();
		self.tokens = tokens;
		self.changed(now)
	}

	/// Release a debounced change once its interval has elapsed.
	///
	/// Edits that returned to the last released value release nothing.
	pub fn poll(&mut self, now: Instant) -> Option<CriteriaChange> {
		let since = self.pending_since?;
		if now.saturating_duration_since(since) < self.debounce {
			return None;
		}
		self.pending_since = None;
		self.release()
	}

	fn changed(&mut self, now: Instant) -> Option<CriteriaChange> {
		if self.debounce.is_zero() {
			return self.release();
		}
		self.pending_since = Some(now);
		None
	}

	fn release(&mut self) -> Option<CriteriaChange> {
		if self.emitted.text == self.text && self.emitted.tokens == self.tokens {
			return None;
		}
		self.emitted = CriteriaChange {
			text: self.text.clone(),
			tokens: self.tokens.clone(),
		};
		Some(self.emitted.clone())
	}
}
