//! Tab/Session Resolver.
//!
//! Turns the user's `--tab` argument into a concrete tab id. Ordinals are
//! positions in the listing fetched at resolution time, never cached, since
//! they shift whenever tabs open, close or move.

use std::fmt;
use std::str::FromStr;

use tabctl_protocol::{TabId, TabInfo};
use thiserror::Error;

pub const MAX_ORDINAL: u8 = 9;

/// A user-supplied tab reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabRef {
	/// 1-based position in the current listing.
	Ordinal(u8),
	/// Browser tab id; written `id:<n>` for small ids.
	Id(TabId),
}

impl TabRef {
	pub fn needs_listing(&self) -> bool {
		matches!(self, TabRef::Ordinal(_))
	}
}

impl fmt::Display for TabRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			TabRef::Ordinal(n) => write!(f, "{n}"),
			TabRef::Id(id) => write!(f, "id:{id}"),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
	#[error("tab {ordinal} is out of range: only {count} tab(s) open")]
	OrdinalOutOfRange { ordinal: u8, count: usize },

	#[error("no tab selected; pass --tab or run `tabctl tabs select <tab>`")]
	NoTabSelected,

	#[error("invalid tab reference `{0}`: expected 1-{MAX_ORDINAL}, a tab id, or id:<n>")]
	InvalidReference(String),
}

impl FromStr for TabRef {
	type Err = ResolveError;

	fn from_str(raw: &str) -> Result<Self, Self::Err> {
		let trimmed = raw.trim();
		let invalid = || ResolveError::InvalidReference(raw.to_string());

		if let Some(id) = trimmed.strip_prefix("id:") {
			return id.trim().parse::<TabId>().ok().filter(|id| *id >= 0).map(TabRef::Id).ok_or_else(invalid);
		}

		match trimmed.parse::<TabId>() {
			Ok(n) if (1..=MAX_ORDINAL as TabId).contains(&n) => Ok(TabRef::Ordinal(n as u8)),
			Ok(n) if n > MAX_ORDINAL as TabId => Ok(TabRef::Id(n)),
			_ => Err(invalid()),
		}
	}
}

/// Resolves `reference` against `listing`, falling back to the persisted
/// active tab when no reference is given.
pub fn resolve(listing: &[TabInfo], reference: Option<TabRef>, active: Option<TabId>) -> Result<TabId, ResolveError> {
	match reference {
		Some(TabRef::Ordinal(ordinal)) => usize::from(ordinal)
			.checked_sub(1)
			.and_then(|index| listing.get(index))
			.map(|tab| tab.id)
			.ok_or(ResolveError::OrdinalOutOfRange {
				ordinal,
				count: listing.len(),
			}),
		Some(TabRef::Id(id)) => Ok(id),
		None => active.ok_or(ResolveError::NoTabSelected),
	}
}
