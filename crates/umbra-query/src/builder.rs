//! Programmatic construction of query forms.
//!
//! Builds the same vector-encoded forms the parser consumes, so every
//! query goes through one validation path.

use umbra_types::Result;

use crate::ast::{Form, Query};

#[derive(Default)]
pub struct QueryBuilder {
    find: Vec<Form>,
    in_spec: Vec<Form>,
    with: Vec<Form>,
    where_clauses: Vec<Form>,
}

/// `?var` symbol form.
pub fn var(name: &str) -> Form {
    Form::sym(name)
}

/// `[e a v]` pattern clause.
pub fn pattern(e: Form, a: Form, v: Form) -> Form {
    Form::vector([e, a, v])
}

/// `(op arg)` aggregate find element.
pub fn agg(op: &str, arg: &str) -> Form {
    Form::list([Form::sym(op), Form::sym(arg)])
}

/// `(f args...)` expression call.
pub fn app(name: &str, args: impl IntoIterator<Item = Form>) -> Form {
    let mut items = vec![Form::sym(name)];
    items.extend(args);
    Form::List(items)
}

/// `[(expr)]` filter clause.
pub fn filter(expr: Form) -> Form {
    Form::vector([expr])
}

/// `[(expr) target]` bind clause.
pub fn bind(expr: Form, target: Form) -> Form {
    Form::vector([expr, target])
}

/// `(not clauses...)` anti-join clause.
pub fn not(clauses: impl IntoIterator<Item = Form>) -> Form {
    let mut items = vec![Form::sym("not")];
    items.extend(clauses);
    Form::List(items)
}

/// `(or clauses...)` union clause.
pub fn or(clauses: impl IntoIterator<Item = Form>) -> Form {
    let mut items = vec![Form::sym("or")];
    items.extend(clauses);
    Form::List(items)
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find(mut self, elems: impl IntoIterator<Item = Form>) -> Self {
        self.find.extend(elems);
        self
    }

    /// `[elem .]` scalar projection.
    pub fn find_scalar(mut self, elem: Form) -> Self {
        self.find = vec![elem, Form::sym(".")];
        self
    }

    /// `[[elem ...]]` collection projection.
    pub fn find_coll(mut self, elem: Form) -> Self {
        self.find = vec![Form::vector([elem, Form::sym("...")])];
        self
    }

    /// `[[elems]]` first-tuple projection.
    pub fn find_tuple(mut self, elems: impl IntoIterator<Item = Form>) -> Self {
        self.find = vec![Form::Vector(elems.into_iter().collect())];
        self
    }

    pub fn input(mut self, binding: Form) -> Self {
        self.in_spec.push(binding);
        self
    }

    pub fn with_var(mut self, name: &str) -> Self {
        self.with.push(Form::sym(name));
        self
    }

    pub fn where_clause(mut self, clause: Form) -> Self {
        self.where_clauses.push(clause);
        self
    }

    pub fn where_all(mut self, clauses: impl IntoIterator<Item = Form>) -> Self {
        self.where_clauses.extend(clauses);
        self
    }

    pub fn build(self) -> Result<Query> {
        let mut forms = Vec::new();
        forms.push(Form::kw(":find"));
        forms.extend(self.find);
        if !self.in_spec.is_empty() {
            forms.push(Form::kw(":in"));
            forms.extend(self.in_spec);
        }
        if !self.with.is_empty() {
            forms.push(Form::kw(":with"));
            forms.extend(self.with);
        }
        forms.push(Form::kw(":where"));
        forms.extend(self.where_clauses);
        Query::parse(&forms)
    }
}
