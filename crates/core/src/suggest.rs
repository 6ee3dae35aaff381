//! Suggested filters and scopes derived from the current free text.
//!
//! The engine is stateless: it asks each classifier what tokens the text could
//! turn into and merges the answers, leaving out tokens the user already
//! applied.

use crate::criteria::{FilterSpec, ScopeSpec, Token};

/// Shortest word that can complete an attribute value.
const MIN_PREFIX_CHARS: usize = 2;

/// Proposes tokens for a piece of free text.
pub trait CriteriaClassifier: Send + Sync {
	fn classify(&self, text: &str) -> Vec<Token>;
}

/// Suggests `field=value` filters whose value starts with a word of the text.
#[derive(Debug, Clone)]
pub struct AttributeClassifier {
	field: String,
	values: Vec<String>,
}

impl AttributeClassifier {
	pub fn new(
		field: impl Into<String>,
		values: impl IntoIterator<Item = impl Into<String>>,
	) -> Self {
		Self {
			field: field.into(),
			values: values.into_iter().map(Into::into).collect(),
		}
	}
}

impl CriteriaClassifier for AttributeClassifier {
	fn classify(&self, text: &str) -> Vec<Token> {
		let words: Vec<String> = text
			.split_whitespace()
			.filter(|word| word.chars().count() >= MIN_PREFIX_CHARS)
			.map(str::to_lowercase)
			.collect();
		if words.is_empty() {
			return Vec::new();
		}

		self.values
			.iter()
			.filter(|value| {
				let value = value.to_lowercase();
				words.iter().any(|word| value.starts_with(word.as_str()))
			})
			.map(|value| Token::Filter(FilterSpec::new(self.field.clone(), value.clone())))
			.collect()
	}
}

/// Offers to restrict the text to each configured field.
#[derive(Debug, Clone)]
pub struct ScopeClassifier {
	fields: Vec<String>,
}

impl ScopeClassifier {
	pub fn new(fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
		Self {
			fields: fields.into_iter().map(Into::into).collect(),
		}
	}
}

impl CriteriaClassifier for ScopeClassifier {
	fn classify(&self, text: &str) -> Vec<Token> {
		if text.trim().is_empty() {
			return Vec::new();
		}
		self.fields
			.iter()
			.map(|field| Token::Scope(ScopeSpec::new(field.clone())))
			.collect()
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Suggestions {
	pub filters: Vec<FilterSpec>,
	pub scopes: Vec<ScopeSpec>,
}

impl Suggestions {
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.filters.is_empty() && self.scopes.is_empty()
	}
}

#[derive(Default)]
pub struct SuggestionEngine {
	classifiers: Vec<Box<dyn CriteriaClassifier>>,
}

impl SuggestionEngine {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn with(mut self, classifier: impl CriteriaClassifier + 'static) -> Self {
		self.push(classifier);
		self
	}

	pub fn push(&mut self, classifier: impl CriteriaClassifier + 'static) {
		self.classifiers.push(Box::new(classifier));
	}

	/// Probe every classifier, in registration order.
	#[must_use]
	pub fn suggest(&self, text: &str, applied: &[Token]) -> Suggestions {
		let mut seen: Vec<Token> = Vec::new();
		let mut suggestions = Suggestions::default();
		for token in self
			.classifiers
			.iter()
			.flat_map(|classifier| classifier.classify(text))
		{
			if applied.contains(&token) || seen.contains(&token) {
				continue;
			}
			seen.push(token.clone());
			match token {
				Token::Filter(filter) => suggestions.filters.push(filter),
				Token::Scope(scope) => suggestions.scopes.push(scope),
			}
		}
		suggestions
	}
}
