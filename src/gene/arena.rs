use std::collections::BTreeSet;

use log::trace;
use serde::{Deserialize, Serialize};

use super::kind::*;
use super::spec::{GeneSpec, SpecKind};
use crate::error::{Result, SearchError};

/// Stable handle of a gene inside its [`GeneArena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GeneId(pub(crate) usize);

impl GeneId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct GeneNode {
    pub name: String,
    pub parent: Option<GeneId>,
    pub kind: GeneKind,
    /// Genes whose value must stay equal to this one. Relation only.
    pub(crate) bindings: BTreeSet<GeneId>,
    /// Set when the gene must no longer change (e.g. resolved path params)
    pub(crate) locked: bool,
}

impl GeneNode {
    pub fn bindings(&self) -> &BTreeSet<GeneId> {
        &self.bindings
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }
}

/// Owner of every gene of one individual (or one standalone tree).
///
/// Slot 0 is the root: an object gene named after the owner whose fields are
/// the top-level genes. Removed genes leave an empty slot, so their handles
/// are reported as stale instead of silently pointing at another gene.
#[derive(Debug, Clone)]
pub struct GeneArena {
    nodes: Vec<Option<GeneNode>>,
    root: GeneId,
    /// Recoverable value problems not yet reported
    anomalies: Vec<String>,
}

impl GeneArena {
    pub fn new(root_name: &str) -> Self {
        let root = GeneNode {
            name: root_name.to_string(),
            parent: None,
            kind: GeneKind::Object(ObjectGene { fields: Vec::new() }),
            bindings: BTreeSet::new(),
            locked: false,
        };
        Self {
            nodes: vec![Some(root)],
            root: GeneId(0),
            anomalies: Vec::new(),
        }
    }

    /// Queue a recoverable problem for whoever owns the search run
    pub fn report_anomaly(&mut self, msg: String) {
        trace!("{}", msg);
        self.anomalies.push(msg);
    }

    pub fn take_anomalies(&mut self) -> Vec<String> {
        std::mem::take(&mut self.anomalies)
    }

    pub fn root(&self) -> GeneId {
        self.root
    }

    pub fn contains(&self, id: GeneId) -> bool {
        matches!(self.nodes.get(id.0), Some(Some(_)))
    }

    pub fn get(&self, id: GeneId) -> Result<&GeneNode> {
        self.nodes
            .get(id.0)
            .and_then(|n| n.as_ref())
            .ok_or(SearchError::StaleGene(id))
    }

    pub fn get_mut(&mut self, id: GeneId) -> Result<&mut GeneNode> {
        self.nodes
            .get_mut(id.0)
            .and_then(|n| n.as_mut())
            .ok_or(SearchError::StaleGene(id))
    }

    pub fn kind(&self, id: GeneId) -> Result<&GeneKind> {
        Ok(&self.get(id)?.kind)
    }

    pub fn kind_mut(&mut self, id: GeneId) -> Result<&mut GeneKind> {
        Ok(&mut self.get_mut(id)?.kind)
    }

    pub fn name(&self, id: GeneId) -> Result<&str> {
        Ok(&self.get(id)?.name)
    }

    pub fn parent(&self, id: GeneId) -> Result<Option<GeneId>> {
        Ok(self.get(id)?.parent)
    }

    pub fn children(&self, id: GeneId) -> Result<Vec<GeneId>> {
        Ok(self.get(id)?.kind.children())
    }

    /// Number of live genes, root included
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }

    pub fn live_ids(&self) -> impl Iterator<Item = GeneId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_some())
            .map(|(i, _)| GeneId(i))
    }

    /// Top-level genes, i.e. the fields of the root
    pub fn top_genes(&self) -> Vec<GeneId> {
        self.children(self.root).unwrap_or_default()
    }

    /// Instantiate `spec` as a new top-level gene
    pub fn insert_top(&mut self, spec: &GeneSpec) -> Result<GeneId> {
        let root = self.root;
        let id = self.insert(spec, Some(root))?;
        if let GeneKind::Object(o) = self.kind_mut(root)? {
            o.fields.push(id);
        }
        Ok(id)
    }

    /// Instantiate `spec` under `parent`.
    ///
    /// The caller is responsible for registering the returned handle in the
    /// parent's children (arrays do it when growing).
    pub fn insert(&mut self, spec: &GeneSpec, parent: Option<GeneId>) -> Result<GeneId> {
        if spec.name.trim().is_empty() {
            return Err(SearchError::BlankGeneName);
        }

        let id = GeneId(self.nodes.len());
        self.nodes.push(None);

        let kind = match &spec.kind {
            SpecKind::Integer(g) => {
                check_range(&spec.name, g.min as f64, g.max as f64)?;
                let mut g = g.clone();
                g.value = g.value.max(g.min).min(g.max);
                GeneKind::Integer(g)
            }
            SpecKind::Long(g) => {
                check_range(&spec.name, g.min as f64, g.max as f64)?;
                let mut g = g.clone();
                g.value = g.value.max(g.min).min(g.max);
                GeneKind::Long(g)
            }
            SpecKind::Double(g) => {
                check_range(&spec.name, g.min, g.max)?;
                GeneKind::Double(g.clone())
            }
            SpecKind::Boolean(g) => GeneKind::Boolean(g.clone()),
            SpecKind::String(g) => {
                if g.min_length > g.max_length {
                    return Err(SearchError::EmptyDomain(format!(
                        "string gene {} has min length {} > max length {}",
                        spec.name, g.min_length, g.max_length
                    )));
                }
                GeneKind::String(g.clone())
            }
            SpecKind::Enum(g) => {
                if g.values.is_empty() {
                    return Err(SearchError::EmptyDomain(format!(
                        "enum gene {} has no values",
                        spec.name
                    )));
                }
                let mut g = g.clone();
                g.index = g.index.min(g.values.len() - 1);
                GeneKind::Enum(g)
            }
            SpecKind::Object(fields) => {
                let fields = fields
                    .iter()
                    .map(|f| self.insert(f, Some(id)))
                    .collect::<Result<Vec<_>>>()?;
                GeneKind::Object(ObjectGene { fields })
            }
            SpecKind::Array {
                template,
                elements,
                min_size,
                max_size,
            } => {
                if min_size > max_size {
                    return Err(SearchError::EmptyDomain(format!(
                        "array gene {} has min size {} > max size {}",
                        spec.name, min_size, max_size
                    )));
                }
                let elements = elements
                    .iter()
                    .take(*max_size)
                    .map(|e| self.insert(e, Some(id)))
                    .collect::<Result<Vec<_>>>()?;
                GeneKind::Array(ArrayGene {
                    template: template.clone(),
                    elements,
                    min_size: *min_size,
                    max_size: *max_size,
                })
            }
            SpecKind::Tuple {
                elements,
                last_element_treated_specially,
            } => {
                let elements = elements
                    .iter()
                    .map(|e| self.insert(e, Some(id)))
                    .collect::<Result<Vec<_>>>()?;
                GeneKind::Tuple(TupleGene {
                    elements,
                    last_element_treated_specially: *last_element_treated_specially,
                })
            }
            SpecKind::Optional {
                gene,
                is_active,
                selectable,
            } => {
                let gene = self.insert(gene, Some(id))?;
                GeneKind::Optional(OptionalGene {
                    gene,
                    is_active: *is_active && *selectable,
                    selectable: *selectable,
                })
            }
            SpecKind::Cycle => GeneKind::Cycle,
            SpecKind::Limit => GeneKind::Limit,
            SpecKind::Date { year, month, day } => {
                let year = self.insert(&GeneSpec::integer("year", 1900, 2100).with_value_i32(*year), Some(id))?;
                let month = self.insert(&GeneSpec::integer("month", 1, 12).with_value_i32(*month), Some(id))?;
                let day = self.insert(&GeneSpec::integer("day", 1, 31).with_value_i32(*day), Some(id))?;
                GeneKind::Date(DateGene { year, month, day })
            }
            SpecKind::Time {
                hour,
                minute,
                second,
            } => {
                let hour = self.insert(&GeneSpec::integer("hour", 0, 23).with_value_i32(*hour), Some(id))?;
                let minute = self.insert(&GeneSpec::integer("minute", 0, 59).with_value_i32(*minute), Some(id))?;
                let second = self.insert(&GeneSpec::integer("second", 0, 59).with_value_i32(*second), Some(id))?;
                GeneKind::Time(TimeGene {
                    hour,
                    minute,
                    second,
                })
            }
            SpecKind::SqlAutoIncrement => GeneKind::SqlAutoIncrement,
            SpecKind::SqlPrimaryKey {
                gene,
                table,
                unique_id,
            } => {
                let gene = self.insert(gene, Some(id))?;
                GeneKind::SqlPrimaryKey(SqlPrimaryKeyGene {
                    gene,
                    table: table.clone(),
                    unique_id: *unique_id,
                })
            }
            SpecKind::SqlForeignKey(g) => GeneKind::SqlForeignKey(g.clone()),
        };

        self.nodes[id.0] = Some(GeneNode {
            name: spec.name.clone(),
            parent,
            kind,
            bindings: BTreeSet::new(),
            locked: !spec.mutable,
        });

        Ok(id)
    }

    /// Owned copy of the subtree rooted at `id`, values included.
    /// Bindings are not part of the export.
    pub fn export(&self, id: GeneId) -> Result<GeneSpec> {
        let node = self.get(id)?;
        let kind = match &node.kind {
            GeneKind::Integer(g) => SpecKind::Integer(g.clone()),
            GeneKind::Long(g) => SpecKind::Long(g.clone()),
            GeneKind::Double(g) => SpecKind::Double(g.clone()),
            GeneKind::Boolean(g) => SpecKind::Boolean(g.clone()),
            GeneKind::String(g) => SpecKind::String(g.clone()),
            GeneKind::Enum(g) => SpecKind::Enum(g.clone()),
            GeneKind::Object(o) => SpecKind::Object(
                o.fields
                    .iter()
                    .map(|f| self.export(*f))
                    .collect::<Result<Vec<_>>>()?,
            ),
            GeneKind::Array(a) => SpecKind::Array {
                template: a.template.clone(),
                elements: a
                    .elements
                    .iter()
                    .map(|e| self.export(*e))
                    .collect::<Result<Vec<_>>>()?,
                min_size: a.min_size,
                max_size: a.max_size,
            },
            GeneKind::Tuple(t) => SpecKind::Tuple {
                elements: t
                    .elements
                    .iter()
                    .map(|e| self.export(*e))
                    .collect::<Result<Vec<_>>>()?,
                last_element_treated_specially: t.last_element_treated_specially,
            },
            GeneKind::Optional(o) => SpecKind::Optional {
                gene: Box::new(self.export(o.gene)?),
                is_active: o.is_active,
                selectable: o.selectable,
            },
            GeneKind::Cycle => SpecKind::Cycle,
            GeneKind::Limit => SpecKind::Limit,
            GeneKind::Date(d) => SpecKind::Date {
                year: self.int_value(d.year)?,
                month: self.int_value(d.month)?,
                day: self.int_value(d.day)?,
            },
            GeneKind::Time(t) => SpecKind::Time {
                hour: self.int_value(t.hour)?,
                minute: self.int_value(t.minute)?,
                second: self.int_value(t.second)?,
            },
            GeneKind::SqlAutoIncrement => SpecKind::SqlAutoIncrement,
            GeneKind::SqlPrimaryKey(pk) => SpecKind::SqlPrimaryKey {
                gene: Box::new(self.export(pk.gene)?),
                table: pk.table.clone(),
                unique_id: pk.unique_id,
            },
            GeneKind::SqlForeignKey(fk) => SpecKind::SqlForeignKey(fk.clone()),
        };

        Ok(GeneSpec {
            name: node.name.clone(),
            kind,
            mutable: !node.locked,
        })
    }

    /// Remove the subtree rooted at `id`, detaching it from its parent and
    /// dropping every binding that pointed into it. Returns the removed handles.
    pub fn remove_subtree(&mut self, id: GeneId) -> Result<Vec<GeneId>> {
        if id == self.root {
            return Err(SearchError::InvalidTemplate("cannot remove the root gene".to_string()));
        }
        let removed = self.flat_view(id)?;

        if let Some(parent) = self.parent(id)? {
            match self.kind_mut(parent)? {
                GeneKind::Object(o) => o.fields.retain(|f| *f != id),
                GeneKind::Array(a) => a.elements.retain(|e| *e != id),
                GeneKind::Tuple(t) => t.elements.retain(|e| *e != id),
                _ => {
                    return Err(SearchError::InvalidTemplate(format!(
                        "cannot detach gene {:?} from a fixed-shape parent",
                        id
                    )))
                }
            }
        }

        for r in &removed {
            self.nodes[r.0] = None;
        }

        let removed_set: BTreeSet<GeneId> = removed.iter().copied().collect();
        for node in self.nodes.iter_mut().flatten() {
            node.bindings.retain(|b| !removed_set.contains(b));
        }

        Ok(removed)
    }

    /// Pre-order list of `id` and all its descendants
    pub fn flat_view(&self, id: GeneId) -> Result<Vec<GeneId>> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let children = self.children(current)?;
            out.push(current);
            stack.extend(children.into_iter().rev());
        }
        Ok(out)
    }

    /// Topmost ancestor reachable through parent links
    pub fn root_of(&self, id: GeneId) -> Result<GeneId> {
        let mut current = id;
        let mut steps = 0;
        while let Some(parent) = self.parent(current)? {
            current = parent;
            steps += 1;
            if steps > self.nodes.len() {
                return Err(SearchError::InvalidTemplate(format!(
                    "parent chain of {:?} does not terminate",
                    id
                )));
            }
        }
        Ok(current)
    }

    /// Dotted names from the top-level gene down to `id`, root excluded
    pub fn path_of(&self, id: GeneId) -> Result<String> {
        let mut names = Vec::new();
        let mut current = Some(id);
        while let Some(c) = current {
            if c == self.root {
                break;
            }
            let node = self.get(c)?;
            names.push(node.name.clone());
            current = node.parent;
        }
        names.reverse();
        Ok(names.join("."))
    }

    pub fn is_ancestor_of(&self, ancestor: GeneId, id: GeneId) -> Result<bool> {
        let mut current = self.parent(id)?;
        while let Some(c) = current {
            if c == ancestor {
                return Ok(true);
            }
            current = self.parent(c)?;
        }
        Ok(false)
    }

    /// Lock `id` and its subtree against mutation
    pub fn prevent_mutation(&mut self, id: GeneId) -> Result<()> {
        for g in self.flat_view(id)? {
            self.get_mut(g)?.locked = true;
        }
        Ok(())
    }

    pub(crate) fn int_value(&self, id: GeneId) -> Result<i32> {
        match self.kind(id)? {
            GeneKind::Integer(g) => Ok(g.value),
            other => Err(SearchError::TypeMismatch {
                expected: "IntegerGene".to_string(),
                actual: other.type_name().to_string(),
            }),
        }
    }

    pub(crate) fn set_int_value(&mut self, id: GeneId, value: i32) -> Result<()> {
        match self.kind_mut(id)? {
            GeneKind::Integer(g) => {
                g.value = value.max(g.min).min(g.max);
                Ok(())
            }
            other => Err(SearchError::TypeMismatch {
                expected: "IntegerGene".to_string(),
                actual: other.type_name().to_string(),
            }),
        }
    }
}

fn check_range(name: &str, min: f64, max: f64) -> Result<()> {
    if min > max {
        return Err(SearchError::EmptyDomain(format!(
            "gene {} has min {} > max {}",
            name, min, max
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_object() -> GeneSpec {
        GeneSpec::object(
            "body",
            vec![
                GeneSpec::integer("a", 0, 10),
                GeneSpec::string("b", 0, 5),
                GeneSpec::optional("c", GeneSpec::object("inner", vec![GeneSpec::boolean("d", true)])),
            ],
        )
    }

    #[test]
    fn test_blank_name_rejected() {
        let mut arena = GeneArena::new("root");
        let result = arena.insert_top(&GeneSpec::integer("  ", 0, 1));
        assert!(matches!(result, Err(SearchError::BlankGeneName)));
    }

    #[test]
    fn test_insert_sets_parents() {
        let mut arena = GeneArena::new("root");
        let body = arena.insert_top(&sample_object()).unwrap();

        for g in arena.flat_view(body).unwrap() {
            assert_eq!(arena.root_of(g).unwrap(), arena.root());
        }
        assert_eq!(arena.top_genes(), vec![body]);
    }

    #[test]
    fn test_export_round_trip_keeps_shape() {
        let mut arena = GeneArena::new("root");
        let body = arena.insert_top(&sample_object()).unwrap();
        let exported = arena.export(body).unwrap();

        let mut names = Vec::new();
        exported.visit(&mut |g| names.push(g.name.clone()));
        assert_eq!(names, vec!["body", "a", "b", "c", "inner", "d"]);
    }

    #[test]
    fn test_remove_subtree_detects_stale_handles() {
        let mut arena = GeneArena::new("root");
        let body = arena.insert_top(&sample_object()).unwrap();
        let other = arena.insert_top(&GeneSpec::integer("x", 0, 5)).unwrap();
        let a = arena.children(body).unwrap()[0];
        arena.get_mut(other).unwrap().bindings.insert(a);

        let removed = arena.remove_subtree(body).unwrap();
        assert!(removed.contains(&a));
        assert!(matches!(arena.get(a), Err(SearchError::StaleGene(_))));
        assert!(arena.get(other).unwrap().bindings().is_empty());
        assert_eq!(arena.top_genes(), vec![other]);
    }

    #[test]
    fn test_path_of() {
        let mut arena = GeneArena::new("root");
        let body = arena.insert_top(&sample_object()).unwrap();
        let flat = arena.flat_view(body).unwrap();
        let d = *flat.last().unwrap();
        assert_eq!(arena.path_of(d).unwrap(), "body.c.inner.d");
    }

    #[test]
    fn test_invalid_range_is_empty_domain() {
        let mut arena = GeneArena::new("root");
        let spec = GeneSpec::new(
            "x",
            SpecKind::Integer(IntegerGene {
                value: 0,
                min: 5,
                max: 1,
            }),
        );
        assert!(matches!(arena.insert_top(&spec), Err(SearchError::EmptyDomain(_))));
    }
}
