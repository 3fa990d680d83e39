//! Query assembly
//!
//! Merges the per-table selections into one tree rooted at the first
//! selected table, aggregate-bearing tables first. Every other table is
//! attached where the target schema has a relation field leading to it:
//!
//! 1. directly below the root (below its records child when split);
//! 2. below one of the root's existing children;
//! 3. through a bridge: the single FROM table reachable from the root that
//!    itself leads to the table.
//!
//! Anything else is handed to a [`RelationResolver`]. WHERE and ORDER BY
//! leaves stay on the root argument list and are wrapped in relation fields
//! along the path from the root to their column's table.

use log::{debug, warn};
use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::{CompileResult, Error, Unsupported};
use crate::query::{merge_order_keys, Argument, ArgumentValue, NodeId, QueryNode, QueryTree};
use crate::translate::{
    ConditionTree, FromTables, Ordering, Schemas, Selection, TableLeaf, TableSelection,
};

/// An ambiguous or missing relation path awaiting a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationRequest<'a> {
    /// Type the path starts from
    pub parent: &'a str,
    /// Type the path must reach
    pub child: &'a str,
    /// Intermediate types a bridge could go through
    pub candidates: &'a [String],
}

impl RelationRequest<'_> {
    pub fn manual_entry_needed(&self) -> Unsupported {
        Unsupported::ManualRelationEntryNeeded {
            parent: self.parent.to_string(),
            child: self.child.to_string(),
            candidates: self.candidates.to_vec(),
        }
    }

    pub fn unresolvable(&self) -> Unsupported {
        Unsupported::RelationPathUnresolvable {
            parent: self.parent.to_string(),
            child: self.child.to_string(),
        }
    }
}

/// Decision provider for relation paths the assembler cannot settle
pub trait RelationResolver: Send + Sync {
    /// Returns the index of the chosen candidate
    fn choose(&self, request: &RelationRequest<'_>) -> Result<usize, Unsupported>;
}

/// Resolver for batch runs: every ambiguity is a failure
#[derive(Debug, Clone, Copy, Default)]
pub struct NonInteractive;

impl RelationResolver for NonInteractive {
    fn choose(&self, request: &RelationRequest<'_>) -> Result<usize, Unsupported> {
        Err(request.manual_entry_needed())
    }
}

/// Builds the query tree of one example
pub fn assemble(
    schemas: Schemas<'_>,
    from: &FromTables,
    selection: &Selection,
    filter: Option<ConditionTree<TableLeaf>>,
    ordering: Ordering,
    resolver: &dyn RelationResolver,
) -> CompileResult<QueryTree> {
    let mut assembler = Assembler::new(schemas, from, resolver);

    let mut tables: Vec<&TableSelection> = selection.tables.iter().collect();
    tables.sort_by_key(|table| !table.has_aggregates());
    let (first, rest) = tables.split_first().ok_or(Unsupported::EmptySelection)?;

    let root = assembler.add_root(first)?;
    for table in rest {
        assembler.attach(root, table)?;
    }

    let mut arguments = Vec::new();
    if let Some(filter) = filter {
        let filter = filter.try_map(&mut |leaf| assembler.place(leaf))?;
        arguments.push(Argument::named(
            schemas.config.where_argument_name.clone(),
            ArgumentValue::Object(vec![filter.into_argument()]),
        ));
    }
    if !ordering.keys.is_empty() {
        let keys = ordering
            .keys
            .into_iter()
            .map(|leaf| assembler.place(leaf))
            .collect::<CompileResult<Vec<_>>>()?;
        arguments.push(Argument::named(
            schemas.config.order_by_argument_name.clone(),
            ArgumentValue::Object(merge_order_keys(keys)),
        ));
    }
    arguments.extend(ordering.limit);
    assembler.tree.node_mut(root).arguments = arguments;

    if let Some(distinct) = &selection.distinct {
        assembler.place_distinct(distinct)?;
    }

    Ok(assembler.tree)
}

struct Assembler<'a> {
    schemas: Schemas<'a>,
    from: &'a FromTables,
    resolver: &'a dyn RelationResolver,
    tree: QueryTree,
    /// Relation paths from the root, by table
    paths: HashMap<usize, Vec<String>>,
}

impl<'a> Assembler<'a> {
    fn new(schemas: Schemas<'a>, from: &'a FromTables, resolver: &'a dyn RelationResolver) -> Self {
        Assembler {
            schemas,
            from,
            resolver,
            tree: QueryTree::new(),
            paths: HashMap::new(),
        }
    }

    fn suffix(&self, aggregate: bool) -> Option<&'a str> {
        aggregate.then_some(self.schemas.config.aggregate_field_suffix.as_str())
    }

    /// Name of the relation field from `parent` to `child`, if any
    fn relation(
        &self,
        parent: usize,
        child: usize,
        suffix: Option<&str>,
    ) -> CompileResult<Option<String>> {
        let parent = &self.schemas.relational.table(parent)?.name;
        let child = &self.schemas.relational.table(child)?.name;
        Ok(self
            .schemas
            .target
            .relation_field(parent, child, suffix)
            .map(|field| field.name.clone()))
    }

    /// Tables bridging `parent` to `child` in one hop each
    fn intermediates(
        &self,
        parent: usize,
        child: usize,
        suffix: Option<&str>,
        tables: impl Iterator<Item = usize>,
    ) -> CompileResult<Vec<usize>> {
        let mut found = Vec::new();
        for table in tables {
            if table == parent || table == child {
                continue;
            }
            if self.relation(parent, table, None)?.is_some()
                && self.relation(table, child, suffix)?.is_some()
            {
                found.push(table);
            }
        }
        Ok(found)
    }

    /// Whether any chain of relations leads from `parent` to `child`
    fn connected(&self, parent: usize, child: usize, suffix: Option<&str>) -> CompileResult<bool> {
        let count = self.schemas.relational.tables().len();
        let mut seen = HashSet::from([parent]);
        let mut queue = VecDeque::from([parent]);
        while let Some(table) = queue.pop_front() {
            if self.relation(table, child, suffix)?.is_some() {
                return Ok(true);
            }
            for next in 0..count {
                if next != child
                    && !seen.contains(&next)
                    && self.relation(table, next, None)?.is_some()
                {
                    seen.insert(next);
                    queue.push_back(next);
                }
            }
        }
        Ok(false)
    }

    /// Picks the bridge table from `parent` to `child`
    ///
    /// A single FROM table bridging the two is taken as is. Otherwise the
    /// resolver chooses among the FROM bridges, or among every schema table
    /// able to bridge when FROM has none. The resolver never sees an empty
    /// candidate list: without any one-hop bridge the pair is either too deep
    /// or not connected at all.
    ///
    /// # Arguments
    ///
    /// * `parent` - Table the bridge hangs below
    /// * `child` - Table the bridge must lead to
    /// * `suffix` - Aggregate suffix of the last hop, if the child aggregates
    ///
    /// # Returns
    ///
    /// * `Ok(table)` - The bridge table
    /// * `Err(Unsupported::NestingDepth)` - Only longer chains connect the two
    /// * `Err(Unsupported::RelationPathUnresolvable)` - Nothing connects the two
    fn bridge_table(&self, parent: usize, child: usize, suffix: Option<&str>) -> CompileResult<usize> {
        let mut candidates = self.intermediates(parent, child, suffix, self.from.iter())?;
        if candidates.len() == 1 {
            return Ok(candidates[0]);
        }
        if candidates.is_empty() {
            let all = 0..self.schemas.relational.tables().len();
            candidates = self.intermediates(parent, child, suffix, all)?;
        }
        if candidates.is_empty() {
            let reason = if self.connected(parent, child, suffix)? {
                self.nesting_depth(parent, child)?
            } else {
                self.unresolvable(parent, child)
            };
            return Err(reason.into());
        }

        let names = candidates
            .iter()
            .map(|table| self.schemas.type_name(*table).map(str::to_string))
            .collect::<Result<Vec<_>, Error>>()?;
        let request = RelationRequest {
            parent: self.schemas.type_name(parent)?,
            child: self.schemas.type_name(child)?,
            candidates: &names,
        };
        warn!(
            "no single relation path from '{}' to '{}', candidates: {:?}",
            request.parent, request.child, names
        );
        let choice = self.resolver.choose(&request)?;
        candidates
            .get(choice)
            .copied()
            .ok_or_else(|| request.unresolvable().into())
    }

    fn nesting_depth(&self, parent: usize, child: usize) -> CompileResult<Unsupported> {
        Ok(Unsupported::NestingDepth {
            parent: self.schemas.type_name(parent)?.to_string(),
            child: self.schemas.type_name(child)?.to_string(),
        })
    }

    fn add_root(&mut self, selection: &TableSelection) -> CompileResult<NodeId> {
        let type_name = self.schemas.type_name(selection.table)?;
        let mut node = QueryNode::new(selection.table, type_name, type_name);
        node.fields = selection.fields.clone();
        let root = self.tree.add(node);
        self.tree.set_root(root);
        if selection.has_aggregates() {
            let name = self.schemas.config.aggregate_name(type_name);
            self.split(root, name);
        }
        Ok(root)
    }

    fn split(&mut self, id: NodeId, name: String) {
        let config = self.schemas.config;
        self.tree.split_aggregate(
            id,
            name,
            &config.aggregate_nodes_field_name,
            &config.aggregate_field_name,
        );
    }

    /// Attaches a selected table below the root
    fn attach(&mut self, root: NodeId, selection: &TableSelection) -> CompileResult<()> {
        let aggregate = selection.has_aggregates();
        let suffix = self.suffix(aggregate);
        let root_table = self.tree.node(root).table;
        let root_records = self.tree.records(root);

        if let Some(field) = self.relation(root_table, selection.table, suffix)? {
            return self.add_child(root_records, selection, field);
        }

        for child in self.tree.relation_children(root).to_vec() {
            let child_table = self.tree.node(child).table;
            if let Some(field) = self.relation(child_table, selection.table, suffix)? {
                let parent = self.tree.records(child);
                return self.add_child(parent, selection, field);
            }
        }

        let found = self.intermediates(root_table, selection.table, suffix, self.from.iter())?;
        if found.len() != 1 {
            for child in self.tree.relation_children(root).to_vec() {
                let child_table = self.tree.node(child).table;
                let deeper =
                    self.intermediates(child_table, selection.table, suffix, self.from.iter())?;
                if !deeper.is_empty() {
                    return Err(self.nesting_depth(root_table, selection.table)?.into());
                }
            }
        }

        let bridge_table = self.bridge_table(root_table, selection.table, suffix)?;
        let bridge = self.bridge(root_records, bridge_table)?;
        let field = self
            .relation(bridge_table, selection.table, suffix)?
            .ok_or_else(|| self.unresolvable(root_table, selection.table))?;
        debug!(
            "bridging '{}' through '{}'",
            self.tree.node(root).table_name,
            self.tree.node(bridge).table_name
        );
        self.add_child(bridge, selection, field)
    }

    fn unresolvable(&self, parent: usize, child: usize) -> Unsupported {
        let name = |table| {
            self.schemas
                .type_name(table)
                .map(str::to_string)
                .unwrap_or_default()
        };
        Unsupported::RelationPathUnresolvable {
            parent: name(parent),
            child: name(child),
        }
    }

    /// Checks that a node attached below `parent` stays within the depth cap
    fn check_depth(&self, parent: NodeId, child_table: usize) -> CompileResult<()> {
        let depth = self.tree.depth(parent).unwrap_or(1) + 1;
        if depth > self.schemas.config.max_nesting_depth {
            return Err(self
                .nesting_depth(self.tree.node(parent).table, child_table)?
                .into());
        }
        Ok(())
    }

    /// Adds the selection of a table below `parent` under `field`
    ///
    /// A plain selection reuses a bridge created earlier for the same
    /// relation, its fields going before the bridge's own children.
    fn add_child(
        &mut self,
        parent: NodeId,
        selection: &TableSelection,
        field: String,
    ) -> CompileResult<()> {
        if !selection.has_aggregates() {
            let existing = self.tree.node(parent).children.iter().copied().find(|child| {
                let node = self.tree.node(*child);
                node.table == selection.table && node.name == field && !node.aggregate_split
            });
            if let Some(existing) = existing {
                let node = self.tree.node_mut(existing);
                let mut fields = selection.fields.clone();
                fields.append(&mut node.fields);
                node.fields = fields;
                return Ok(());
            }
        }

        self.check_depth(parent, selection.table)?;
        let type_name = self.schemas.type_name(selection.table)?;
        let mut node = QueryNode::new(selection.table, type_name, field.clone());
        node.fields = selection.fields.clone();
        let child = self.tree.add(node);
        self.tree.attach(parent, child);
        if selection.has_aggregates() {
            self.split(child, field);
        }
        Ok(())
    }

    /// The child of `parent` for `table`, created fieldless when missing
    fn bridge(&mut self, parent: NodeId, table: usize) -> CompileResult<NodeId> {
        let existing = self.tree.node(parent).children.iter().copied().find(|child| {
            let node = self.tree.node(*child);
            node.table == table && !node.aggregate_split
        });
        if let Some(existing) = existing {
            return Ok(existing);
        }

        let parent_table = self.tree.node(parent).table;
        let field = self
            .relation(parent_table, table, None)?
            .ok_or_else(|| self.unresolvable(parent_table, table))?;
        self.check_depth(parent, table)?;
        let node = QueryNode::new(table, self.schemas.type_name(table)?, field);
        let bridge = self.tree.add(node);
        self.tree.attach(parent, bridge);
        Ok(bridge)
    }

    /// Table path from `id` down to a node of `table`, `id` excluded
    fn tree_path(&self, id: NodeId, table: usize) -> Option<Vec<usize>> {
        for child in self.tree.relation_children(id) {
            let child_table = self.tree.node(*child).table;
            if child_table == table {
                return Some(vec![table]);
            }
            if let Some(mut rest) = self.tree_path(*child, table) {
                rest.insert(0, child_table);
                return Some(rest);
            }
        }
        None
    }

    /// Relation field names leading from the root to `table`
    fn path_to(&mut self, table: usize) -> CompileResult<Vec<String>> {
        if let Some(path) = self.paths.get(&table) {
            return Ok(path.clone());
        }
        let root = self.tree.root().ok_or(Unsupported::EmptySelection)?;
        let root_table = self.tree.node(root).table;
        let path = self.resolve_path(root, root_table, table)?;
        if path.len() + 1 > self.schemas.config.max_nesting_depth {
            return Err(self.nesting_depth(root_table, table)?.into());
        }
        self.paths.insert(table, path.clone());
        Ok(path)
    }

    fn resolve_path(
        &self,
        root: NodeId,
        root_table: usize,
        table: usize,
    ) -> CompileResult<Vec<String>> {
        if table == root_table {
            return Ok(Vec::new());
        }

        if let Some(tables) = self.tree_path(root, table) {
            let mut path = Vec::with_capacity(tables.len());
            let mut parent = root_table;
            for child in tables {
                match self.relation(parent, child, None)? {
                    Some(field) => path.push(field),
                    None => break,
                }
                parent = child;
            }
            if parent == table {
                return Ok(path);
            }
        }

        if let Some(field) = self.relation(root_table, table, None)? {
            return Ok(vec![field]);
        }

        let bridge = self.bridge_table(root_table, table, None)?;
        let first = self.relation(root_table, bridge, None)?;
        let second = self.relation(bridge, table, None)?;
        match (first, second) {
            (Some(first), Some(second)) => Ok(vec![first, second]),
            _ => Err(self.unresolvable(root_table, table).into()),
        }
    }

    /// Wraps a clause leaf in the relation path to its table
    fn place(&mut self, leaf: TableLeaf) -> CompileResult<Argument> {
        let path = self.path_to(leaf.table)?;
        Ok(path
            .into_iter()
            .rev()
            .fold(leaf.argument, |argument, relation| argument.through(relation)))
    }

    /// Puts `distinct_on` on the node selecting its column
    fn place_distinct(&mut self, distinct: &TableLeaf) -> CompileResult<()> {
        let owner = self
            .tree
            .walk()
            .into_iter()
            .find(|id| self.tree.node(*id).table == distinct.table)
            .ok_or_else(|| {
                Error::SchemaMismatch(format!(
                    "distinct column of table {} is not selected",
                    distinct.table
                ))
            })?;
        let target = self.tree.records(owner);
        self.tree
            .node_mut(target)
            .arguments
            .push(distinct.argument.clone());
        Ok(())
    }
}
