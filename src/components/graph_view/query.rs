//! Search query parsing.
//!
//! The grammar is a whitespace-separated list of tokens, all lower-cased:
//!
//! - `field:value` or `field:"quoted value"` for a known field,
//! - `"quoted phrase"` or a bare word, matched against everything.
//!
//! Tokens are implicitly AND-ed. There is no OR or NOT. Unknown fields are kept
//! as a literal `key:value` bare term so they don't widen the match.

/// Node attribute a predicate is scoped to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueryField {
	Title,
	Summary,
	Type,
	Tag,
	Hyponym,
	Hypernym,
	/// Any metadata bucket (tags, hyponyms, hypernyms, linked metadata nodes).
	Metadata,
}

impl QueryField {
	pub fn from_key(key: &str) -> Option<Self> {
		Some(match key {
			"title" => QueryField::Title,
			"summary" => QueryField::Summary,
			"type" => QueryField::Type,
			"tag" => QueryField::Tag,
			"hyponym" => QueryField::Hyponym,
			"hypernym" => QueryField::Hypernym,
			"metadata" => QueryField::Metadata,
			_ => return None,
		})
	}
}

/// One `{field, value}` condition. `field == None` means "any field".
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Predicate {
	pub field: Option<QueryField>,
	pub value: String,
}

impl Predicate {
	pub fn any(value: impl Into<String>) -> Self {
		Self {
			field: None,
			value: value.into(),
		}
	}

	pub fn scoped(field: QueryField, value: impl Into<String>) -> Self {
		Self {
			field: Some(field),
			value: value.into(),
		}
	}
}

/// Ordered predicates that must all hold. Empty matches every node.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParsedQuery {
	pub predicates: Vec<Predicate>,
}

impl ParsedQuery {
	pub fn is_empty(&self) -> bool {
		self.predicates.is_empty()
	}
}

/// Parse raw search input. Never fails; garbage yields bare terms or nothing.
pub fn parse_search_query(input: &str) -> ParsedQuery {
	let text = input.trim().to_lowercase();
	let mut predicates = Vec::new();
	let mut rest = text.as_str();

	loop {
		rest = rest.trim_start();
		if rest.is_empty() {
			break;
		}
		let (predicate, remaining) = next_token(rest);
		if let Some(predicate) = predicate {
			predicates.push(predicate);
		}
		rest = remaining;
	}

	ParsedQuery { predicates }
}

/// Read one token from the front of `input` (which starts with non-whitespace).
fn next_token(input: &str) -> (Option<Predicate>, &str) {
	if let Some(quoted) = input.strip_prefix('"') {
		let (phrase, rest) = read_quoted(quoted);
		let predicate = (!phrase.is_empty()).then(|| Predicate::any(phrase));
		return (predicate, rest);
	}

	let key_len = input
		.find(|c: char| !(c.is_alphanumeric() || c == '_'))
		.unwrap_or(input.len());
	let after_key = &input[key_len..];

	if key_len > 0 {
		if let Some(value_part) = after_key.strip_prefix(':') {
			let key = &input[..key_len];
			if let Some(quoted) = value_part.strip_prefix('"') {
				let (value, rest) = read_quoted(quoted);
				return (field_predicate(key, value), rest);
			}
			let (value, rest) = read_bare(value_part);
			if !value.is_empty() {
				return (field_predicate(key, value), rest);
			}
		}
	}

	let (word, rest) = read_bare(input);
	(Some(Predicate::any(word)), rest)
}

fn field_predicate(key: &str, value: &str) -> Option<Predicate> {
	if value.is_empty() {
		return None;
	}
	Some(match QueryField::from_key(key) {
		Some(field) => Predicate::scoped(field, value),
		None => Predicate::any(format!("{key}:{value}")),
	})
}

/// Split at the closing quote; an unterminated quote runs to the end.
fn read_quoted(input: &str) -> (&str, &str) {
	match input.find('"') {
		Some(end) => (&input[..end], &input[end + 1..]),
		None => (input, ""),
	}
}

fn read_bare(input: &str) -> (&str, &str) {
	let end = input.find(char::is_whitespace).unwrap_or(input.len());
	(&input[..end], &input[end..])
}
