use std::cmp::Ordering;

use serde_json::Value;

use super::{CollectionPath, Document};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    ArrayContains,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    /// A document lacking the field never matches, for any operator.
    pub fn matches(&self, doc: &Document) -> bool {
        let Some(actual) = doc.field(&self.field) else {
            return false;
        };
        match self.op {
            FilterOp::Eq => actual == &self.value,
            FilterOp::Ne => actual != &self.value,
            FilterOp::ArrayContains => actual
                .as_array()
                .map(|items| items.contains(&self.value))
                .unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// Filters over one collection, with optional single-field ordering and a
/// result limit.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: CollectionPath,
    pub filters: Vec<Filter>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new(collection: CollectionPath) -> Self {
        Self {
            collection,
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    pub fn where_eq(self, field: &str, value: impl Into<Value>) -> Self {
        self.filter(field, FilterOp::Eq, value.into())
    }

    pub fn where_ne(self, field: &str, value: impl Into<Value>) -> Self {
        self.filter(field, FilterOp::Ne, value.into())
    }

    pub fn array_contains(self, field: &str, value: impl Into<Value>) -> Self {
        self.filter(field, FilterOp::ArrayContains, value.into())
    }

    fn filter(mut self, field: &str, op: FilterOp, value: Value) -> Self {
        self.filters.push(Filter {
            field: field.to_string(),
            op,
            value,
        });
        self
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.to_string(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        if doc.path.collection() != self.collection {
            return false;
        }
        if let Some(order) = &self.order_by {
            if doc.field(&order.field).is_none() {
                return false;
            }
        }
        self.filters.iter().all(|f| f.matches(doc))
    }

    /// Filter, sort and truncate an unordered candidate set.
    pub fn apply(&self, docs: impl IntoIterator<Item = Document>) -> Vec<Document> {
        let mut out: Vec<Document> = docs.into_iter().filter(|d| self.matches(d)).collect();
        if let Some(order) = &self.order_by {
            out.sort_by(|a, b| {
                let ord = compare_values(a.field(&order.field), b.field(&order.field))
                    .then_with(|| a.path.cmp(&b.path));
                match order.direction {
                    Direction::Asc => ord,
                    Direction::Desc => ord.reverse(),
                }
            });
        }
        if let Some(limit) = self.limit {
            out.truncate(limit);
        }
        out
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            match (x.as_i64(), y.as_i64()) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => x
                    .as_f64()
                    .partial_cmp(&y.as_f64())
                    .unwrap_or(Ordering::Equal),
            }
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, data: Value) -> Document {
        Document {
            path: CollectionPath::new("chat-queue").doc(id),
            data,
        }
    }

    #[test]
    fn ne_filter_skips_missing_field_and_equal_value() {
        let q = Query::new(CollectionPath::new("chat-queue")).where_ne("userId", "a");
        assert!(!q.matches(&doc("a", json!({ "userId": "a" }))));
        assert!(!q.matches(&doc("x", json!({}))));
        assert!(q.matches(&doc("b", json!({ "userId": "b" }))));
    }

    #[test]
    fn array_contains_checks_membership() {
        let q = Query::new(CollectionPath::new("chat-queue")).array_contains("participants", "u1");
        assert!(q.matches(&doc("c", json!({ "participants": ["u1", "u2"] }))));
        assert!(!q.matches(&doc("d", json!({ "participants": ["u3"] }))));
        assert!(!q.matches(&doc("e", json!({ "participants": "u1" }))));
    }

    #[test]
    fn apply_orders_numerically_and_limits() {
        let q = Query::new(CollectionPath::new("chat-queue"))
            .order_by("enqueuedAt", Direction::Asc)
            .limit(2);
        let docs = vec![
            doc("late", json!({ "enqueuedAt": 300 })),
            doc("early", json!({ "enqueuedAt": 20 })),
            doc("mid", json!({ "enqueuedAt": 100 })),
            doc("unordered", json!({})),
        ];
        let ids: Vec<String> = q.apply(docs).iter().map(|d| d.id().to_string()).collect();
        assert_eq!(ids, vec!["early", "mid"]);
    }

    #[test]
    fn apply_desc_reverses() {
        let q = Query::new(CollectionPath::new("chat-queue")).order_by("n", Direction::Desc);
        let docs = vec![doc("a", json!({ "n": 1 })), doc("b", json!({ "n": 2 }))];
        let ids: Vec<String> = q.apply(docs).iter().map(|d| d.id().to_string()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn documents_from_other_collections_never_match() {
        let q = Query::new(CollectionPath::new("chats"));
        assert!(!q.matches(&doc("a", json!({}))));
    }
}
