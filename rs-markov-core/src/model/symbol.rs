use std::borrow::Cow;
use std::fmt::Debug;
use std::hash::Hash;

/// Marker trait for the atomic elements of a source sequence.
///
/// The engine compares states by value, so a symbol only has to be
/// cloneable, hashable, comparable and printable for diagnostics. The
/// blanket implementation makes any such type usable without opting in.
pub trait Symbol: Clone + Eq + Hash + Debug {}

impl<T: Clone + Eq + Hash + Debug> Symbol for T {}

/// Capability trait for symbols that have an atomic text form.
///
/// Only string rendering requires this; building and walking a model never
/// look inside a symbol. Returning `None` marks the symbol as having no
/// text form, which the renderer reports as a type mismatch.
pub trait TextSymbol: Symbol {
	/// Returns the symbol's text form, or `None` if it has none.
	fn as_text(&self) -> Option<Cow<'_, str>>;
}

impl TextSymbol for char {
	fn as_text(&self) -> Option<Cow<'_, str>> {
		Some(Cow::Owned(self.to_string()))
	}
}

impl TextSymbol for String {
	fn as_text(&self) -> Option<Cow<'_, str>> {
		Some(Cow::Borrowed(self.as_str()))
	}
}

impl TextSymbol for &str {
	fn as_text(&self) -> Option<Cow<'_, str>> {
		Some(Cow::Borrowed(*self))
	}
}
