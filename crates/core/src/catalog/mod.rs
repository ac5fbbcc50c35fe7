//! Persisted record shapes and the identifiers which scope them.

use std::fmt::{self, Display};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::code::Pattern;
use crate::err::{Error, Result};

/// The organization which owns a record. Codes and pro numbers are unique
/// within a tenant, never across tenants.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "store-postgres", derive(sqlx::Type), sqlx(transparent))]
#[serde(transparent)]
pub struct TenantId(pub Uuid);

impl TenantId {
	/// Creates a new random tenant identifier
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}
}

impl From<Uuid> for TenantId {
	fn from(v: Uuid) -> Self {
		Self(v)
	}
}

impl Display for TenantId {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		Display::fmt(&self.0, f)
	}
}

/// The kinds of entity which carry a generated business code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum EntityKind {
	Worker,
	Customer,
	Location,
}

impl EntityKind {
	pub const ALL: [EntityKind; 3] = [EntityKind::Worker, EntityKind::Customer, EntityKind::Location];

	/// The durable table which holds records of this kind
	pub fn table(&self) -> &'static str {
		match self {
			Self::Worker => "workers",
			Self::Customer => "customers",
			Self::Location => "locations",
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Worker => "worker",
			Self::Customer => "customer",
			Self::Location => "location",
		}
	}

	/// The patterns this kind of entity can derive a prefix from. The first
	/// entry is the default pattern.
	pub fn supported_patterns(&self) -> &'static [Pattern] {
		match self {
			Self::Worker => {
				&[Pattern::TypeLastName, Pattern::LastName, Pattern::InitialLastName]
			}
			Self::Customer | Self::Location => &[Pattern::Name, Pattern::City],
		}
	}

	pub fn default_pattern(&self) -> Pattern {
		self.supported_patterns()[0]
	}

	pub fn supports(&self, pattern: Pattern) -> bool {
		self.supported_patterns().contains(&pattern)
	}

	/// Resolves a stored pattern name, falling back to the default
	/// pattern when the name is unknown or unsupported by this kind.
	pub fn resolve(&self, pattern: &str) -> Pattern {
		match Pattern::parse(pattern) {
			Some(p) if self.supports(p) => p,
			_ => self.default_pattern(),
		}
	}
}

impl Display for EntityKind {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A stored entity row. Only the columns code generation and the
/// optimistic update protocol rely upon are typed, the rest of the
/// entity lives in `data`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "store-postgres", derive(sqlx::FromRow))]
pub struct Record {
	pub id: Uuid,
	pub organization_id: TenantId,
	pub code: String,
	pub version: i64,
	pub data: serde_json::Value,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

/// The projection of a record scanned by the counter initializer.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "store-postgres", derive(sqlx::FromRow))]
pub struct CodeRow {
	pub code: String,
	pub organization_id: TenantId,
}

/// The durable pro number counter of a tenant.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "store-postgres", derive(sqlx::FromRow))]
pub struct ProNumberCounter {
	pub id: Uuid,
	pub organization_id: TenantId,
	pub last_used_number: i64,
	pub updated_at: DateTime<Utc>,
}

/// The root key generation record of a tenant.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "store-postgres", derive(sqlx::FromRow))]
pub struct MasterKey {
	pub id: Uuid,
	pub organization_id: TenantId,
	pub created_at: DateTime<Utc>,
}

/// The key generation record of one kind of entity within a tenant,
/// holding the pattern new codes are derived from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntityKey {
	pub id: Uuid,
	pub master_key_id: Uuid,
	pub organization_id: TenantId,
	pub kind: EntityKind,
	pub pattern: Pattern,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

/// Checks that a table name is a plain identifier which can be
/// interpolated into a statement.
pub fn validate_table(name: &str) -> Result<&str> {
	let mut chars = name.chars();
	let valid = match chars.next() {
		Some(c) if c.is_ascii_alphabetic() || c == '_' => {
			chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
		}
		_ => false,
	};
	if !valid {
		return Err(Error::InvalidTable(name.to_owned()));
	}
	Ok(name)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn tables_are_plain_identifiers() {
		assert!(validate_table("workers").is_ok());
		assert!(validate_table("_legacy_2019").is_ok());
		assert!(matches!(validate_table(""), Err(Error::InvalidTable(_))));
		assert!(matches!(validate_table("1workers"), Err(Error::InvalidTable(_))));
		assert!(matches!(validate_table("workers; drop"), Err(Error::InvalidTable(_))));
	}

	#[test]
	fn kinds_map_to_tables() {
		assert_eq!(EntityKind::Worker.table(), "workers");
		assert_eq!(EntityKind::Customer.table(), "customers");
		assert_eq!(EntityKind::Location.table(), "locations");
		assert_eq!(EntityKind::Customer.to_string(), "customer");
	}

	#[test]
	fn unsupported_patterns_fall_back_to_the_default() {
		assert_eq!(EntityKind::Worker.resolve("LASTNAME-COUNTER"), Pattern::LastName);
		assert_eq!(EntityKind::Worker.resolve("CITY-COUNTER"), Pattern::TypeLastName);
		assert_eq!(EntityKind::Customer.resolve("SOMETHING"), Pattern::Name);
		assert_eq!(EntityKind::Location.resolve("CITY-COUNTER"), Pattern::City);
	}
}
