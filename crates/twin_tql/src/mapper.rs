//! Executable mapping rules.
//!
//! A [`Mapper`] is the parsed form of one TQL statement. Parsing resolves the
//! target path of every select field and derives the dependency
//! [`Tentacle`]s; after that the mapper is immutable and [`Mapper::exec`] is a
//! pure function of its binding.

use std::collections::BTreeMap;

use tracing::debug;
use twin_value::Node;

use crate::ast::{Expr, Statement};
use crate::error::TqlError;
use crate::eval::{Binding, EvalError, evaluate};
use crate::parser::{ParseError, Parser};
use crate::tentacle::{Tentacle, TentacleKind};

/// One select field after alias resolution.
#[derive(Debug, Clone, PartialEq)]
struct TargetField {
    path: String,
    expr: Expr,
}

/// A parsed TQL statement bound to an identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Mapper {
    id: String,
    tql: String,
    target_entity: String,
    fields: Vec<TargetField>,
    source_entities: Vec<String>,
    tentacles: Vec<Tentacle>,
}

impl Mapper {
    /// Parse a property mapper. Its tentacles target the statement's target
    /// entity.
    ///
    /// # Errors
    ///
    /// Returns [`TqlError::Parse`] for malformed text, for a statement that
    /// reads no entity property, or for a field without `as` whose target
    /// path is ambiguous.
    pub fn parse(id: impl Into<String>, tql: impl Into<String>) -> Result<Self, TqlError> {
        Self::build(id.into(), tql.into(), TentacleKind::Property)
    }

    /// Parse a subscription mapper. Its tentacles target the mapper id
    /// itself.
    ///
    /// # Errors
    ///
    /// Same as [`Mapper::parse`].
    pub fn parse_subscription(
        id: impl Into<String>,
        tql: impl Into<String>,
    ) -> Result<Self, TqlError> {
        Self::build(id.into(), tql.into(), TentacleKind::Mapper)
    }

    fn build(id: String, tql: String, kind: TentacleKind) -> Result<Self, TqlError> {
        let Statement { target, fields } = Parser::parse(&tql)?;

        let mut resolved = Vec::with_capacity(fields.len());
        // source entity -> watched paths, both in first-reference order
        let mut sources: Vec<(String, Vec<String>)> = Vec::new();

        for field in fields {
            for reference in field.expr.references() {
                let idx = match sources.iter().position(|(e, _)| *e == reference.entity) {
                    Some(idx) => idx,
                    None => {
                        sources.push((reference.entity.clone(), Vec::new()));
                        sources.len() - 1
                    }
                };
                let items = &mut sources[idx].1;
                if !items.contains(&reference.path) {
                    items.push(reference.path.clone());
                }
            }

            let path = match field.alias {
                Some(alias) => alias,
                None => default_path(&field.expr).ok_or_else(|| ParseError {
                    line: field.line,
                    col: field.col,
                    message: "field without 'as' must reference exactly one property"
                        .to_string(),
                })?,
            };
            resolved.push(TargetField {
                path,
                expr: field.expr,
            });
        }

        if sources.is_empty() {
            let (line, col) = statement_start(&tql);
            return Err(ParseError {
                line,
                col,
                message: "statement references no entity property".to_string(),
            }
            .into());
        }

        let tentacle_target = match kind {
            TentacleKind::Property => target.clone(),
            TentacleKind::Mapper => id.clone(),
        };
        let tentacles = sources
            .iter()
            .map(|(entity, items)| {
                Tentacle::new(kind, tentacle_target.clone(), entity.clone(), items.clone())
            })
            .collect();
        let source_entities = sources.into_iter().map(|(entity, _)| entity).collect();

        Ok(Self {
            id,
            tql,
            target_entity: target,
            fields: resolved,
            source_entities,
            tentacles,
        })
    }

    /// Evaluate every select field against `binding`.
    ///
    /// Fields whose inputs are missing or fail to evaluate are skipped, so a
    /// rule over several sources can run with only one source's data.
    ///
    /// # Errors
    ///
    /// Returns [`TqlError::NothingComputed`] with the first field's error
    /// when no field produced a value.
    pub fn exec(&self, binding: &Binding) -> Result<BTreeMap<String, Node>, TqlError> {
        let mut out = BTreeMap::new();
        let mut first_error: Option<EvalError> = None;

        for field in &self.fields {
            match evaluate(&field.expr, binding) {
                Ok(value) => {
                    out.insert(field.path.clone(), value);
                }
                Err(e) => {
                    debug!(mapper = %self.id, path = %field.path, error = %e, "field skipped");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) if out.is_empty() => Err(TqlError::NothingComputed(e)),
            _ => Ok(out),
        }
    }

    /// An independent deep copy.
    #[must_use]
    pub fn copy(&self) -> Self {
        self.clone()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The statement text as declared.
    pub fn tql(&self) -> &str {
        &self.tql
    }

    pub fn target_entity(&self) -> &str {
        &self.target_entity
    }

    /// Target property paths, one per select field.
    pub fn target_paths(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.path.as_str())
    }

    /// Distinct referenced entities in first-reference order.
    pub fn source_entities(&self) -> &[String] {
        &self.source_entities
    }

    pub fn tentacles(&self) -> &[Tentacle] {
        &self.tentacles
    }

    /// Whether this mapper reads from `entity_id`.
    pub fn depends_on(&self, entity_id: &str) -> bool {
        self.source_entities.iter().any(|e| e == entity_id)
    }
}

/// The path a field without `as` writes to: the property path of its only
/// distinct reference.
fn default_path(expr: &Expr) -> Option<String> {
    let refs = expr.references();
    let (first, rest) = refs.split_first()?;
    rest.iter()
        .all(|r| r == first)
        .then(|| first.path.clone())
}

fn statement_start(tql: &str) -> (usize, usize) {
    let (mut line, mut col) = (1, 1);
    for c in tql.chars() {
        match c {
            '\n' => {
                line += 1;
                col = 1;
            }
            c if c.is_ascii_whitespace() => col += 1,
            _ => break,
        }
    }
    (line, col)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(entries: &[(&str, Node)]) -> Binding {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_single_source_mapper() {
        let m = Mapper::parse("tql1", "insert into test123 select test234.temp as temp").unwrap();
        assert_eq!(m.id(), "tql1");
        assert_eq!(m.target_entity(), "test123");
        assert_eq!(m.source_entities(), ["test234"]);
        assert_eq!(m.target_paths().collect::<Vec<_>>(), ["temp"]);

        let tentacles = m.tentacles();
        assert_eq!(tentacles.len(), 1);
        assert_eq!(tentacles[0].kind(), TentacleKind::Property);
        assert_eq!(tentacles[0].target_id(), "test123");
        assert_eq!(tentacles[0].source_id(), "test234");
        assert_eq!(tentacles[0].items(), ["temp"]);

        let out = m
            .exec(&binding(&[("test234.temp", Node::from("123"))]))
            .unwrap();
        assert_eq!(out.get("temp"), Some(&Node::from("123")));
    }

    #[test]
    fn test_multi_source_mapper() {
        let m = Mapper::parse(
            "tql2",
            "insert into entity3 select entity1.property1 as property1, \
             entity2.property2.name as property2, \
             entity1.property1 + entity2.property3 as property3",
        )
        .unwrap();
        assert_eq!(m.source_entities(), ["entity1", "entity2"]);
        assert_eq!(m.tentacles().len(), 2);
        assert_eq!(m.tentacles()[0].items(), ["property1"]);
        assert_eq!(m.tentacles()[1].items(), ["property2.name", "property3"]);

        let input = binding(&[
            ("entity1.property1", Node::Int(123)),
            ("entity2.property2.name", Node::from("tomas")),
            ("entity2.property3", Node::Int(123)),
        ]);
        let out = m.exec(&input).unwrap();
        assert_eq!(out.get("property1"), Some(&Node::Int(123)));
        assert_eq!(out.get("property2"), Some(&Node::from("tomas")));
        assert_eq!(out.get("property3"), Some(&Node::Int(246)));
    }

    #[test]
    fn test_bare_reference_targets_its_own_path() {
        let m = Mapper::parse("tql3", "insert into sub123 select test123.temp").unwrap();
        assert_eq!(m.target_paths().collect::<Vec<_>>(), ["temp"]);
    }

    #[test]
    fn test_computed_field_defaults_to_its_reference() {
        let m = Mapper::parse("m", "insert into t select a.x + 1, a.y * a.y").unwrap();
        assert_eq!(m.target_paths().collect::<Vec<_>>(), ["x", "y"]);
        let out = m
            .exec(&binding(&[("a.x", Node::Int(4)), ("a.y", Node::Int(3))]))
            .unwrap();
        assert_eq!(out.get("x"), Some(&Node::Int(5)));
        assert_eq!(out.get("y"), Some(&Node::Int(9)));
    }

    #[test]
    fn test_ambiguous_default_path_is_rejected() {
        let err = Mapper::parse("m", "insert into t select a.x as x, a.x + b.y").unwrap_err();
        match err {
            TqlError::Parse(e) => assert_eq!((e.line, e.col), (1, 32)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_statement_without_references_is_rejected() {
        let err = Mapper::parse("m", "  insert into t select 1 as x").unwrap_err();
        match err {
            TqlError::Parse(e) => {
                assert_eq!((e.line, e.col), (1, 3));
                assert!(e.message.contains("no entity property"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_hyphenated_subtraction_executes() {
        let m = Mapper::parse("m", "insert into t select a.x-1 as y").unwrap();
        assert_eq!(m.tentacles()[0].items(), ["x"]);
        let out = m.exec(&binding(&[("a.x", Node::Int(5))])).unwrap();
        assert_eq!(out.get("y"), Some(&Node::Int(4)));
    }

    #[test]
    fn test_uuid_entities_and_path_concatenation() {
        let m = Mapper::parse(
            "mapper123",
            "insert into 7ffed0dc-3ed5-4137-9c16-a2c9c74e0bf6 select \
             f8f0327b-51e4-400a-a2e1-c95e371ec99d.path  + '/' + \
             '7ffed0dc-3ed5-4137-9c16-a2c9c74e0bf6' as path",
        )
        .unwrap();
        assert_eq!(m.target_entity(), "7ffed0dc-3ed5-4137-9c16-a2c9c74e0bf6");
        assert_eq!(m.source_entities(), ["f8f0327b-51e4-400a-a2e1-c95e371ec99d"]);

        let out = m
            .exec(&binding(&[
                ("f8f0327b-51e4-400a-a2e1-c95e371ec99d.path", Node::from("test")),
                ("entity.property3", Node::from("g123")),
            ]))
            .unwrap();
        assert_eq!(
            out.get("path"),
            Some(&Node::from("test/7ffed0dc-3ed5-4137-9c16-a2c9c74e0bf6"))
        );
    }

    #[test]
    fn test_nested_target_path() {
        let m = Mapper::parse(
            "mapper123",
            "insert into bc90e5ba-4d15-4738-bf38-fdfe16740d9c select \
             0074c68f-679c-4290-a2be-3878c8fb75f6.sysField._spacePath + \
             '/bc90e5ba-4d15-4738-bf38-fdfe16740d9c'  as sysField._spacePath",
        )
        .unwrap();
        let out = m
            .exec(&binding(&[(
                "0074c68f-679c-4290-a2be-3878c8fb75f6.sysField._spacePath",
                Node::from("test"),
            )]))
            .unwrap();
        assert_eq!(
            out.get("sysField._spacePath"),
            Some(&Node::from("test/bc90e5ba-4d15-4738-bf38-fdfe16740d9c"))
        );
    }

    #[test]
    fn test_partial_binding_skips_field() {
        let m = Mapper::parse(
            "m",
            "insert into t select a.x as x, a.x + b.y as z",
        )
        .unwrap();

        let partial = m.exec(&binding(&[("a.x", Node::Int(1))])).unwrap();
        assert_eq!(partial.get("x"), Some(&Node::Int(1)));
        assert!(!partial.contains_key("z"));

        let full = m
            .exec(&binding(&[("a.x", Node::Int(1)), ("b.y", Node::Int(2))]))
            .unwrap();
        assert_eq!(full.get("z"), Some(&Node::Int(3)));
    }

    #[test]
    fn test_nothing_computed() {
        let m = Mapper::parse("m", "insert into t select a.x + b.y as z").unwrap();
        let err = m.exec(&binding(&[("a.x", Node::Int(1))])).unwrap_err();
        assert_eq!(
            err,
            TqlError::NothingComputed(EvalError::UnresolvedReference("b.y".to_string()))
        );
        // A failed call leaves the mapper usable.
        let out = m
            .exec(&binding(&[("a.x", Node::Int(1)), ("b.y", Node::Int(2))]))
            .unwrap();
        assert_eq!(out.get("z"), Some(&Node::Int(3)));
    }

    #[test]
    fn test_exec_is_idempotent() {
        let m = Mapper::parse("m", "insert into t select a.x * 2 as y, a.s + '!' as s").unwrap();
        let b = binding(&[("a.x", Node::Int(21)), ("a.s", Node::from("hi"))]);
        assert_eq!(m.exec(&b).unwrap(), m.exec(&b).unwrap());
    }

    #[test]
    fn test_subscription_tentacles_target_mapper() {
        let m = Mapper::parse_subscription("sub-1", "insert into sub1 select dev1.temp, dev2.hum")
            .unwrap();
        assert_eq!(m.tentacles().len(), 2);
        for t in m.tentacles() {
            assert_eq!(t.kind(), TentacleKind::Mapper);
            assert_eq!(t.target_id(), "sub-1");
        }
    }

    #[test]
    fn test_sources_are_unique() {
        let m = Mapper::parse("m", "insert into t select a.x + a.x as y, a.x as z, b.q as w")
            .unwrap();
        assert_eq!(m.source_entities(), ["a", "b"]);
        assert_eq!(m.tentacles()[0].items(), ["x"]);
        assert!(m.depends_on("b"));
        assert!(!m.depends_on("t"));
    }

    #[test]
    fn test_copy_is_independent() {
        let m = Mapper::parse("m", "insert into t select a.x as y").unwrap();
        let copy = m.copy();
        drop(m);
        assert_eq!(copy.tql(), "insert into t select a.x as y");
        assert_eq!(copy.target_entity(), "t");
    }
}
