//! Shape-aware views over a completed task's result.
mod shape;
mod view;

pub use shape::{is_link, string_form, FieldShape, ShapeKind};
pub use view::{Cell, FieldProjection, ListMode, ProjectionBody, ResultView};
