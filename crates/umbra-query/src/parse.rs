//! Validation of query forms into the typed AST.
//!
//! The recognized section keys are `:find`, `:in`, `:with`, and
//! `:where`; anything else fails the whole query up front.

use umbra_types::{Result, UmbraError, Value};

use crate::ast::{
    AggArg, AggOp, BindTarget, Clause, ClausePattern, Expr, FindElem, FindSpec, Form, InBinding,
    PatternSlot, Query, Var,
};

impl Query {
    /// Parses a vector-encoded query: section keywords followed by
    /// their forms, e.g. `[:find ?name :where [?e :artist/name ?name]]`.
    pub fn parse(forms: &[Form]) -> Result<Query> {
        const FIND: usize = 0;
        const IN: usize = 1;
        const WITH: usize = 2;
        const WHERE: usize = 3;

        let mut sections: [Vec<&Form>; 4] = Default::default();
        let mut seen = [false; 4];
        let mut unknown: Vec<String> = Vec::new();
        let mut current: Option<usize> = None;

        for form in forms {
            if let Some(key) = section_key(form) {
                current = match key {
                    "find" => Some(FIND),
                    "in" => Some(IN),
                    "with" => Some(WITH),
                    "where" => Some(WHERE),
                    other => {
                        unknown.push(other.to_owned());
                        None
                    }
                };
                if let Some(section) = current {
                    seen[section] = true;
                }
                continue;
            }
            match current {
                Some(section) => sections[section].push(form),
                None if unknown.is_empty() => {
                    return Err(UmbraError::Invalid(
                        "query must start with a clause keyword",
                    ))
                }
                None => {}
            }
        }

        if !unknown.is_empty() {
            return Err(UmbraError::UnknownClauses(unknown));
        }
        if !seen[FIND] || sections[FIND].is_empty() {
            return Err(UmbraError::MissingClause("find"));
        }
        if !seen[WHERE] {
            return Err(UmbraError::MissingClause("where"));
        }

        Ok(Query {
            find: parse_find(&sections[FIND])?,
            in_spec: sections[IN]
                .iter()
                .map(|form| parse_in_binding(form))
                .collect::<Result<_>>()?,
            with: sections[WITH]
                .iter()
                .map(|form| parse_var(form))
                .collect::<Result<_>>()?,
            where_clauses: sections[WHERE]
                .iter()
                .map(|form| parse_clause(form))
                .collect::<Result<_>>()?,
        })
    }
}

fn section_key(form: &Form) -> Option<&str> {
    match form {
        Form::Lit(Value::Kw(kw)) if kw.ns.is_none() => Some(&kw.name),
        _ => None,
    }
}

fn parse_find(forms: &[&Form]) -> Result<FindSpec> {
    if let [elem, Form::Sym(dot)] = forms {
        if dot == "." {
            return Ok(FindSpec::Scalar(parse_find_elem(elem)?));
        }
    }
    if let [Form::Vector(inner)] = forms {
        if let [elem, Form::Sym(ellipsis)] = inner.as_slice() {
            if ellipsis == "..." {
                return Ok(FindSpec::Coll(parse_find_elem(elem)?));
            }
        }
        return Ok(FindSpec::Tuple(
            inner.iter().map(parse_find_elem).collect::<Result<_>>()?,
        ));
    }
    Ok(FindSpec::Relation(
        forms
            .iter()
            .map(|form| parse_find_elem(form))
            .collect::<Result<_>>()?,
    ))
}

fn parse_find_elem(form: &Form) -> Result<FindElem> {
    match form {
        Form::Sym(name) if name.starts_with('?') => Ok(FindElem::Var(Var::new(name.clone()))),
        Form::List(items) => parse_aggregate(items),
        _ => Err(UmbraError::Invalid(
            "find element must be a variable or an aggregate",
        )),
    }
}

fn parse_aggregate(items: &[Form]) -> Result<FindElem> {
    let [Form::Sym(op_name), arg] = items else {
        return Err(UmbraError::IllegalAggregate(
            "aggregate must be (op arg)".to_owned(),
        ));
    };
    let op = match op_name.as_str() {
        "count" => AggOp::Count,
        "count-distinct" => AggOp::CountDistinct,
        "sum" => AggOp::Sum,
        "min" => AggOp::Min,
        "max" => AggOp::Max,
        "avg" => AggOp::Avg,
        other => {
            return Err(UmbraError::IllegalAggregate(format!(
                "unknown aggregate {other}"
            )))
        }
    };
    let arg = match arg {
        Form::Sym(name) if name == "*" => AggArg::Row,
        Form::Sym(name) if name.starts_with('?') => AggArg::Var(Var::new(name.clone())),
        _ => {
            return Err(UmbraError::IllegalAggregate(
                "aggregate argument must be a variable or *".to_owned(),
            ))
        }
    };
    if matches!(arg, AggArg::Row)
        && matches!(op, AggOp::Sum | AggOp::Min | AggOp::Max | AggOp::Avg)
    {
        return Err(UmbraError::IllegalAggregate(format!(
            "({} *) is not defined",
            op.name()
        )));
    }
    Ok(FindElem::Agg { op, arg })
}

fn parse_in_binding(form: &Form) -> Result<InBinding> {
    match form {
        Form::Sym(name) if name == "$" => Ok(InBinding::Database),
        Form::Sym(name) if name.starts_with('?') => Ok(InBinding::Scalar(Var::new(name.clone()))),
        Form::Vector(items) => {
            if let [var, Form::Sym(ellipsis)] = items.as_slice() {
                if ellipsis == "..." {
                    return Ok(InBinding::Coll(parse_var(var)?));
                }
            }
            Ok(InBinding::Tuple(
                items.iter().map(parse_var).collect::<Result<_>>()?,
            ))
        }
        _ => Err(UmbraError::Invalid("unsupported :in binding form")),
    }
}

fn parse_var(form: &Form) -> Result<Var> {
    match form {
        Form::Sym(name) if name.starts_with('?') => Ok(Var::new(name.clone())),
        _ => Err(UmbraError::Invalid("expected a ?variable")),
    }
}

fn parse_clause(form: &Form) -> Result<Clause> {
    match form {
        Form::Vector(items) => match items.as_slice() {
            [Form::List(expr)] => Ok(Clause::Filter(parse_expr_call(expr)?)),
            [Form::List(expr), target] => {
                Ok(Clause::Bind(parse_expr_call(expr)?, parse_bind_target(target)?))
            }
            [e, a, v] => Ok(Clause::Pattern(ClausePattern {
                e: parse_slot(e)?,
                a: parse_slot(a)?,
                v: parse_slot(v)?,
            })),
            _ => Err(UmbraError::Invalid(
                "where clause vector must be a pattern, bind, or filter",
            )),
        },
        Form::List(items) => {
            let Some((Form::Sym(head), rest)) = items.split_first() else {
                return Err(UmbraError::Invalid("where clause list needs an operator"));
            };
            let sub = rest
                .iter()
                .map(parse_clause)
                .collect::<Result<Vec<Clause>>>()?;
            match head.as_str() {
                "not" => Ok(Clause::Not(sub)),
                "or" => Ok(Clause::Or(sub)),
                other => Err(UmbraError::UnsupportedOperation(other.to_owned())),
            }
        }
        _ => Err(UmbraError::Invalid("unsupported where clause form")),
    }
}

fn parse_slot(form: &Form) -> Result<PatternSlot> {
    match form {
        Form::Lit(v) => Ok(PatternSlot::Lit(v.clone())),
        Form::Sym(name) if name == "_" => Ok(PatternSlot::Any),
        Form::Sym(name) if name.starts_with('?') => Ok(PatternSlot::Var(Var::new(name.clone()))),
        _ => Err(UmbraError::Invalid("pattern slot must be a value, ?var, or _")),
    }
}

fn parse_bind_target(form: &Form) -> Result<BindTarget> {
    match form {
        Form::Sym(name) if name.starts_with('?') => Ok(BindTarget::Var(Var::new(name.clone()))),
        Form::Vector(items) => Ok(BindTarget::Tuple(
            items.iter().map(parse_var).collect::<Result<_>>()?,
        )),
        _ => Err(UmbraError::Invalid("bind target must be a ?var or vector")),
    }
}

fn parse_expr(form: &Form) -> Result<Expr> {
    match form {
        Form::Lit(v) => Ok(Expr::Lit(v.clone())),
        Form::Sym(name) if name.starts_with('?') => Ok(Expr::Var(Var::new(name.clone()))),
        Form::Sym(name) => Ok(Expr::Ident(name.clone())),
        Form::List(items) => parse_expr_call(items),
        Form::Vector(_) => Err(UmbraError::Invalid("vectors are not expressions")),
    }
}

fn parse_expr_call(items: &[Form]) -> Result<Expr> {
    let Some((head, args)) = items.split_first() else {
        return Err(UmbraError::Invalid("expression call is empty"));
    };
    let Form::Sym(name) = head else {
        return Err(UmbraError::Invalid(
            "expression call must start with an operator name",
        ));
    };
    Ok(Expr::App(
        name.clone(),
        args.iter().map(parse_expr).collect::<Result<_>>()?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(forms: Vec<Form>) -> Result<Query> {
        Query::parse(&forms)
    }

    #[test]
    fn minimal_query_parses() {
        let query = q(vec![
            Form::kw(":find"),
            Form::sym("?name"),
            Form::kw(":where"),
            Form::vector([Form::sym("?e"), Form::kw(":artist/name"), Form::sym("?name")]),
        ])
        .unwrap();
        assert_eq!(query.find, FindSpec::Relation(vec![FindElem::Var(Var::new("?name"))]));
        assert_eq!(query.where_clauses.len(), 1);
    }

    #[test]
    fn missing_sections_are_rejected() {
        let err = q(vec![Form::kw(":where"), Form::vector([Form::sym("?e"), Form::sym("?a"), Form::sym("?v")])])
            .unwrap_err();
        assert!(matches!(err, UmbraError::MissingClause("find")));
        let err = q(vec![Form::kw(":find"), Form::sym("?e")]).unwrap_err();
        assert!(matches!(err, UmbraError::MissingClause("where")));
    }

    #[test]
    fn unknown_sections_are_rejected() {
        let err = q(vec![
            Form::kw(":find"),
            Form::sym("?e"),
            Form::kw(":having"),
            Form::sym("?e"),
            Form::kw(":where"),
        ])
        .unwrap_err();
        match err {
            UmbraError::UnknownClauses(names) => assert_eq!(names, vec!["having".to_owned()]),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn find_shapes_parse() {
        let scalar = q(vec![
            Form::kw(":find"),
            Form::sym("?x"),
            Form::sym("."),
            Form::kw(":where"),
        ])
        .unwrap();
        assert!(matches!(scalar.find, FindSpec::Scalar(_)));

        let coll = q(vec![
            Form::kw(":find"),
            Form::vector([Form::sym("?x"), Form::sym("...")]),
            Form::kw(":where"),
        ])
        .unwrap();
        assert!(matches!(coll.find, FindSpec::Coll(_)));

        let tuple = q(vec![
            Form::kw(":find"),
            Form::vector([Form::sym("?x"), Form::sym("?y")]),
            Form::kw(":where"),
        ])
        .unwrap();
        assert!(matches!(tuple.find, FindSpec::Tuple(ref elems) if elems.len() == 2));
    }

    #[test]
    fn star_is_illegal_for_numeric_aggregates() {
        let err = q(vec![
            Form::kw(":find"),
            Form::list([Form::sym("sum"), Form::sym("*")]),
            Form::kw(":where"),
        ])
        .unwrap_err();
        assert!(matches!(err, UmbraError::IllegalAggregate(_)));
        let ok = q(vec![
            Form::kw(":find"),
            Form::list([Form::sym("count"), Form::sym("*")]),
            Form::kw(":where"),
        ]);
        assert!(ok.is_ok());
    }

    #[test]
    fn not_or_bind_filter_clauses_parse() {
        let query = q(vec![
            Form::kw(":find"),
            Form::sym("?x"),
            Form::kw(":where"),
            Form::vector([Form::sym("?x"), Form::kw(":size"), Form::sym("?n")]),
            Form::list([
                Form::sym("not"),
                Form::vector([Form::sym("?x"), Form::kw(":internal"), Form::from(true)]),
            ]),
            Form::vector([Form::list([
                Form::sym("<"),
                Form::sym("?n"),
                Form::from(10),
            ])]),
            Form::vector([
                Form::list([Form::sym("+"), Form::sym("?n"), Form::from(1)]),
                Form::sym("?next"),
            ]),
        ])
        .unwrap();
        assert!(matches!(query.where_clauses[1], Clause::Not(_)));
        assert!(matches!(query.where_clauses[2], Clause::Filter(_)));
        assert!(matches!(query.where_clauses[3], Clause::Bind(_, _)));
    }
}
