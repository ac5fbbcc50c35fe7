use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::cnf::{CODE_LENGTH, CODE_PADDING, COUNTER_WIDTH, PREFIX_LENGTH};

/// A named recipe which derives a code prefix from the fields of an entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Pattern {
	#[serde(rename = "NAME-COUNTER")]
	Name,
	#[serde(rename = "CITY-COUNTER")]
	City,
	#[serde(rename = "LASTNAME-COUNTER")]
	LastName,
	#[serde(rename = "INITIAL-LASTNAME-COUNTER")]
	InitialLastName,
	#[serde(rename = "TYPE-LASTNAME-COUNTER")]
	TypeLastName,
}

impl Pattern {
	pub const ALL: [Pattern; 5] = [
		Pattern::Name,
		Pattern::City,
		Pattern::LastName,
		Pattern::InitialLastName,
		Pattern::TypeLastName,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Name => "NAME-COUNTER",
			Self::City => "CITY-COUNTER",
			Self::LastName => "LASTNAME-COUNTER",
			Self::InitialLastName => "INITIAL-LASTNAME-COUNTER",
			Self::TypeLastName => "TYPE-LASTNAME-COUNTER",
		}
	}

	/// Parses a stored pattern name. Names are matched exactly.
	pub fn parse(v: &str) -> Option<Self> {
		Self::ALL.into_iter().find(|p| p.as_str() == v)
	}
}

impl Display for Pattern {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Uppercases a string with a locale independent, one to one mapping.
/// Characters whose uppercase form expands to several characters are
/// kept as they are, so the character count never changes.
pub fn simple_uppercase(v: &str) -> String {
	v.chars()
		.map(|c| {
			let mut upper = c.to_uppercase();
			match (upper.next(), upper.next()) {
				(Some(u), None) => u,
				_ => c,
			}
		})
		.collect()
}

/// Takes at most the first `n` characters of a string.
pub fn take(v: &str, n: usize) -> &str {
	match v.char_indices().nth(n) {
		Some((i, _)) => &v[..i],
		None => v,
	}
}

/// The first four characters of the uppercased source.
pub fn prefix_of(source: &str) -> String {
	simple_uppercase(take(source, PREFIX_LENGTH))
}

/// One leading character followed by the first three characters of the
/// uppercased source. The leading character keeps its case.
pub fn initial_prefix(initial: &str, source: &str) -> String {
	let mut out = String::from(take(initial, 1));
	out.push_str(&simple_uppercase(take(source, PREFIX_LENGTH - 1)));
	out
}

/// Joins a prefix with the zero-padded counter.
pub fn join(prefix: &str, counter: u64) -> String {
	format!("{prefix}{counter:0width$}", width = COUNTER_WIDTH)
}

/// Truncates or right-pads a candidate code to exactly [`CODE_LENGTH`]
/// characters, using [`CODE_PADDING`] as the filler.
pub fn fixed_length(code: &str) -> String {
	let mut out = String::from(take(code, CODE_LENGTH));
	let len = out.chars().count();
	out.extend(std::iter::repeat_n(CODE_PADDING, CODE_LENGTH - len));
	out
}

/// Removes the filler which [`fixed_length`] appended.
pub fn trim_padding(code: &str) -> &str {
	code.trim_end_matches(CODE_PADDING)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn pattern_names_are_closed() {
		for p in Pattern::ALL {
			assert_eq!(Pattern::parse(p.as_str()), Some(p));
		}
		assert_eq!(Pattern::parse("name-counter"), None);
		assert_eq!(Pattern::parse(""), None);
	}

	#[test]
	fn pattern_names_serialize_as_stored() {
		let v = serde_json::to_string(&Pattern::InitialLastName).unwrap();
		assert_eq!(v, "\"INITIAL-LASTNAME-COUNTER\"");
		let p: Pattern = serde_json::from_str("\"CITY-COUNTER\"").unwrap();
		assert_eq!(p, Pattern::City);
	}

	#[test]
	fn prefixes_are_uppercased_and_truncated() {
		assert_eq!(prefix_of("Doe"), "DOE");
		assert_eq!(prefix_of("Target"), "TARG");
		assert_eq!(prefix_of(""), "");
		assert_eq!(prefix_of("Øst-Kamp"), "ØST-");
		assert_eq!(initial_prefix("john", "smith"), "jSMI");
		assert_eq!(initial_prefix("", "Li"), "LI");
	}

	#[test]
	fn uppercasing_never_changes_length() {
		// 'ß' uppercases to "SS"
		assert_eq!(simple_uppercase("straße"), "STRAßE");
		assert_eq!(simple_uppercase("élan"), "ÉLAN");
	}

	#[test]
	fn codes_are_fixed_length() {
		assert_eq!(fixed_length("DOE0001"), "DOE0001   ");
		assert_eq!(fixed_length("TARG0005"), "TARG0005  ");
		assert_eq!(fixed_length("0001"), "0001      ");
		assert_eq!(fixed_length("TARG123456789"), "TARG123456");
		assert_eq!(fixed_length("ÅSEN0001").chars().count(), 10);
		assert_eq!(trim_padding("DOE0001   "), "DOE0001");
	}

	#[test]
	fn counters_are_zero_padded() {
		assert_eq!(join("DOE", 1), "DOE0001");
		assert_eq!(join("TARG", 12345), "TARG12345");
		assert_eq!(join("", 7), "0007");
	}
}
