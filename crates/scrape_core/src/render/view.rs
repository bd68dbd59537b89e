use serde_json::{Map, Value};

use super::shape::{is_link, string_form, FieldShape, ShapeKind};
use crate::task::TaskResult;

/// How record lists are laid out in the structured view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListMode {
    #[default]
    Table,
    /// One key/value block per record.
    Cards,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub text: String,
    pub link: bool,
}

impl Cell {
    fn from_value(value: &Value) -> Self {
        let text = string_form(value);
        let link = is_link(&text);
        Self { text, link }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectionBody {
    Scalar(Cell),
    List(Vec<Cell>),
    Table {
        columns: Vec<String>,
        rows: Vec<Vec<Cell>>,
    },
    Cards(Vec<Vec<(String, Cell)>>),
    Record(Vec<(String, Cell)>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldProjection {
    pub name: String,
    pub kind: ShapeKind,
    pub body: ProjectionBody,
    /// Items before filtering; 1 for scalars and records.
    pub total: usize,
}

impl FieldProjection {
    /// Items left after filtering.
    pub fn shown(&self) -> usize {
        match &self.body {
            ProjectionBody::Scalar(_) | ProjectionBody::Record(_) => 1,
            ProjectionBody::List(items) => items.len(),
            ProjectionBody::Table { rows, .. } => rows.len(),
            ProjectionBody::Cards(cards) => cards.len(),
        }
    }
}

#[derive(Debug, Clone)]
struct ClassifiedField {
    name: String,
    shape: FieldShape,
}

/// Filterable, field-selectable view of one result.
///
/// Fields are classified once, when the view is built. Filter and selection
/// only affect [`ResultView::structured`]; [`ResultView::raw_json`] always
/// renders the whole result.
#[derive(Debug, Clone)]
pub struct ResultView {
    raw: Value,
    fields: Vec<ClassifiedField>,
    selected: Vec<String>,
    filter: String,
    mode: ListMode,
}

impl ResultView {
    pub fn new(result: &TaskResult) -> Self {
        let fields: Vec<ClassifiedField> = result
            .iter()
            .map(|(name, value)| ClassifiedField {
                name: name.clone(),
                shape: FieldShape::classify(value),
            })
            .collect();
        let selected = fields.iter().map(|f| f.name.clone()).collect();
        Self {
            raw: Value::Object(result.clone()),
            fields,
            selected,
            filter: String::new(),
            mode: ListMode::default(),
        }
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn shape(&self, name: &str) -> Option<&FieldShape> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.shape)
    }

    /// Selected field names, in result order.
    pub fn selected(&self) -> &[String] {
        &self.selected
    }

    /// Replaces the selection. Names not present in the result are ignored.
    pub fn select_fields<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let wanted: Vec<S> = names.into_iter().collect();
        self.selected = self
            .fields
            .iter()
            .filter(|f| wanted.iter().any(|w| w.as_ref() == f.name))
            .map(|f| f.name.clone())
            .collect();
    }

    pub fn select_all(&mut self) {
        self.selected = self.fields.iter().map(|f| f.name.clone()).collect();
    }

    /// Flips one field in or out of the selection; returns whether it is now
    /// selected. Unknown names are left alone.
    pub fn toggle_field(&mut self, name: &str) -> bool {
        if self.selected.iter().any(|s| s == name) {
            self.selected.retain(|s| s != name);
            return false;
        }
        if self.shape(name).is_none() {
            return false;
        }
        let mut next = self.selected.clone();
        next.push(name.to_string());
        self.select_fields(next);
        true
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn set_filter(&mut self, term: impl Into<String>) {
        self.filter = term.into();
    }

    pub fn list_mode(&self) -> ListMode {
        self.mode
    }

    pub fn set_list_mode(&mut self, mode: ListMode) {
        self.mode = mode;
    }

    /// Selected fields rendered per shape, with the filter applied to lists.
    pub fn structured(&self) -> Vec<FieldProjection> {
        let term = self.filter.to_lowercase();
        self.fields
            .iter()
            .filter(|f| self.selected.iter().any(|s| *s == f.name))
            .map(|f| project(f, &term, self.mode))
            .collect()
    }

    /// The full result as pretty-printed JSON, keys in their original order.
    pub fn raw_json(&self) -> String {
        format!("{:#}", self.raw)
    }
}

fn project(field: &ClassifiedField, term: &str, mode: ListMode) -> FieldProjection {
    let (body, total) = match &field.shape {
        FieldShape::Scalar(value) => (ProjectionBody::Scalar(Cell::from_value(value)), 1),
        FieldShape::Record(map) => (ProjectionBody::Record(record_cells(map)), 1),
        FieldShape::ScalarList(items) => {
            let cells = items
                .iter()
                .filter(|item| matches_term(&string_form(item), term))
                .map(Cell::from_value)
                .collect();
            (ProjectionBody::List(cells), items.len())
        }
        FieldShape::RecordList { columns, rows } => {
            let kept: Vec<&Value> = rows.iter().filter(|row| row_matches(row, term)).collect();
            let body = match mode {
                ListMode::Table => ProjectionBody::Table {
                    columns: columns.clone(),
                    rows: kept
                        .iter()
                        .map(|row| {
                            columns
                                .iter()
                                .map(|column| {
                                    row.get(column)
                                        .map_or_else(|| Cell::from_value(&Value::Null), Cell::from_value)
                                })
                                .collect()
                        })
                        .collect(),
                },
                ListMode::Cards => ProjectionBody::Cards(
                    kept.iter()
                        .map(|row| match row {
                            Value::Object(map) => record_cells(map),
                            other => vec![(String::new(), Cell::from_value(other))],
                        })
                        .collect(),
                ),
            };
            (body, rows.len())
        }
    };

    FieldProjection {
        name: field.name.clone(),
        kind: field.shape.kind(),
        body,
        total,
    }
}

fn record_cells(map: &Map<String, Value>) -> Vec<(String, Cell)> {
    map.iter()
        .map(|(key, value)| (key.clone(), Cell::from_value(value)))
        .collect()
}

fn matches_term(text: &str, term: &str) -> bool {
    term.is_empty() || text.to_lowercase().contains(term)
}

/// A record row matches when any of its values does. Non-record rows only
/// survive an empty filter.
fn row_matches(row: &Value, term: &str) -> bool {
    if term.is_empty() {
        return true;
    }
    match row {
        Value::Object(map) => map.values().any(|v| matches_term(&string_form(v), term)),
        _ => false,
    }
}
