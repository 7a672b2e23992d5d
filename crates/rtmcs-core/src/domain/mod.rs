//! Domain model (document, ids, collection kinds).

pub mod document;
pub mod ids;
pub mod kind;

pub use document::{Document, Record, Version, record_id};
pub use ids::{Id, IdMarker};
pub use kind::{CollectionKind, Item, Person, Question};

/// Identifier of a Person record.
pub type PersonId = Id<Person>;

/// Identifier of a Question record.
pub type QuestionId = Id<Question>;

/// Identifier of a shop Item record.
pub type ItemId = Id<Item>;
