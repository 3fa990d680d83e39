//! Intermediate GraphQL query tree
//!
//! Nodes live in an arena owned by [`QueryTree`] and refer to each other by
//! [`NodeId`]. Assembly revisits nodes while searching for bridges, so edges
//! are plain index lists rather than shared references.

use crate::sql::AggregateOp;

/// Position of a node in its tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A selected field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    /// A scalar field of the node's type
    Scalar(String),
    /// An aggregate function over some columns
    ///
    /// `count` carries no columns unless it counts distinct values.
    Aggregate {
        op: AggregateOp,
        columns: Vec<String>,
        distinct: bool,
    },
}

/// Name part of an argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgumentName {
    /// A column of `table`, renamed to its schema field by coercion
    Column { table: String, name: String },
    /// A plain key such as `where`, `limit` or `distinct_on`
    Name(String),
    /// Members spliced into the enclosing object
    And,
    /// Members rendered as a list of objects
    Or,
    /// Conjuncts that cannot share one object, rendered as an `_and` list
    All,
    /// A comparison operator such as `_eq`
    Operator(&'static str),
    /// A relation field leading to the column's table
    Relation(String),
}

/// Value part of an argument
#[derive(Debug, Clone, PartialEq)]
pub enum ArgumentValue {
    Str(String),
    Int(i64),
    Double(f64),
    Bool(bool),
    /// A bare enum token such as `desc`
    Enum(String),
    /// A list of values, as taken by `_in`
    List(Vec<ArgumentValue>),
    Object(Vec<Argument>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub name: ArgumentName,
    pub value: ArgumentValue,
    /// Wraps the argument in `_not`
    pub negated: bool,
}

impl Argument {
    pub fn new(name: ArgumentName, value: ArgumentValue) -> Self {
        Argument {
            name,
            value,
            negated: false,
        }
    }

    pub fn named(name: impl Into<String>, value: ArgumentValue) -> Self {
        Self::new(ArgumentName::Name(name.into()), value)
    }

    /// Nests the argument under a relation field
    pub fn through(self, relation: impl Into<String>) -> Self {
        Self::new(
            ArgumentName::Relation(relation.into()),
            ArgumentValue::Object(vec![self]),
        )
    }

    /// Whether two arguments would take the same key of one object
    fn same_key(&self, other: &Argument) -> bool {
        if self.negated || other.negated {
            return self.negated && other.negated;
        }
        self.name == other.name
    }

    /// Folds `other` into this argument, handing it back on a collision
    fn absorb(&mut self, other: Argument) -> Result<(), Argument> {
        let mergeable = !self.negated
            && !other.negated
            && match (&self.name, &self.value, &other.value) {
                (
                    ArgumentName::Column { .. },
                    ArgumentValue::Object(ours),
                    ArgumentValue::Object(theirs),
                ) => !theirs
                    .iter()
                    .any(|predicate| ours.iter().any(|own| own.same_key(predicate))),
                (ArgumentName::Relation(_), ArgumentValue::Object(_), ArgumentValue::Object(_)) => {
                    true
                }
                _ => false,
            };
        if !mergeable {
            return Err(other);
        }
        if let (ArgumentValue::Object(ours), ArgumentValue::Object(theirs)) =
            (&mut self.value, other.value)
        {
            ours.extend(theirs);
            if matches!(self.name, ArgumentName::Relation(_)) {
                *ours = merge_conjuncts(std::mem::take(ours));
            }
        }
        Ok(())
    }
}

fn flatten_conjuncts(conjuncts: Vec<Argument>, out: &mut Vec<Argument>) {
    for conjunct in conjuncts {
        match conjunct {
            Argument {
                name: ArgumentName::And,
                value: ArgumentValue::Object(members),
                negated: false,
            } => flatten_conjuncts(members, out),
            other => out.push(other),
        }
    }
}

/// Combines conjuncts into the members of one object.
///
/// Predicates on the same column share one predicate object and conjuncts
/// behind the same relation share one relation object, merged recursively.
/// Whatever still collides, such as a repeated operator or a second `_not`,
/// goes into a trailing `_and` list.
///
/// # Arguments
///
/// * `conjuncts` - Arguments that must all hold, nested `And` groups included
///
/// # Returns
///
/// Object members without duplicate keys
pub fn merge_conjuncts(conjuncts: Vec<Argument>) -> Vec<Argument> {
    let mut flat = Vec::with_capacity(conjuncts.len());
    flatten_conjuncts(conjuncts, &mut flat);

    let mut merged: Vec<Argument> = Vec::with_capacity(flat.len());
    let mut colliding = Vec::new();
    for conjunct in flat {
        match merged.iter().position(|member| member.same_key(&conjunct)) {
            Some(index) => {
                if let Err(conjunct) = merged[index].absorb(conjunct) {
                    colliding.push(conjunct);
                }
            }
            None => merged.push(conjunct),
        }
    }
    if !colliding.is_empty() {
        merged.push(Argument::new(ArgumentName::All, ArgumentValue::Object(colliding)));
    }
    merged
}

/// Combines `order_by` keys behind the same relation.
///
/// A column ordered twice keeps its first direction.
pub fn merge_order_keys(keys: Vec<Argument>) -> Vec<Argument> {
    let mut merged: Vec<Argument> = Vec::with_capacity(keys.len());
    for key in keys {
        let Some(index) = merged.iter().position(|member| member.name == key.name) else {
            merged.push(key);
            continue;
        };
        let member = &mut merged[index];
        if let (ArgumentName::Relation(_), ArgumentValue::Object(ours), ArgumentValue::Object(theirs)) =
            (&member.name, &mut member.value, key.value)
        {
            ours.extend(theirs);
            *ours = merge_order_keys(std::mem::take(ours));
        }
    }
    merged
}

/// A node of the query tree: one GraphQL selection over one table
#[derive(Debug, Clone, PartialEq)]
pub struct QueryNode {
    /// Relational table index
    pub table: usize,
    /// Target type name of the table
    pub table_name: String,
    /// Field name in the parent selection
    pub name: String,
    pub arguments: Vec<Argument>,
    pub fields: Vec<Field>,
    pub children: Vec<NodeId>,
    /// Children are exactly `[records, aggregate]`
    pub aggregate_split: bool,
}

impl QueryNode {
    pub fn new(table: usize, table_name: impl Into<String>, name: impl Into<String>) -> Self {
        QueryNode {
            table,
            table_name: table_name.into(),
            name: name.into(),
            arguments: Vec::new(),
            fields: Vec::new(),
            children: Vec::new(),
            aggregate_split: false,
        }
    }
}

/// Arena of query nodes with a designated root
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryTree {
    nodes: Vec<QueryNode>,
    root: Option<NodeId>,
}

impl QueryTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a detached node
    pub fn add(&mut self, node: QueryNode) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    pub fn set_root(&mut self, id: NodeId) {
        self.root = Some(id);
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &QueryNode {
        &self.nodes[id.0]
    }

    #[inline]
    pub fn node_mut(&mut self, id: NodeId) -> &mut QueryNode {
        &mut self.nodes[id.0]
    }

    pub fn attach(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[parent.0].children.push(child);
    }

    /// The node holding the records of `id`: its first child when split
    pub fn records(&self, id: NodeId) -> NodeId {
        let node = self.node(id);
        if node.aggregate_split {
            node.children[0]
        } else {
            id
        }
    }

    /// Children reached by relations, looking through an aggregate split
    pub fn relation_children(&self, id: NodeId) -> &[NodeId] {
        &self.node(self.records(id)).children
    }

    /// Splits a node into a records child and an aggregate child
    ///
    /// The node is renamed to its aggregate field; its scalar fields and
    /// children move to the records child, its aggregate fields to the
    /// aggregate child.
    pub fn split_aggregate(
        &mut self,
        id: NodeId,
        aggregate_name: String,
        records_name: &str,
        aggregate_field_name: &str,
    ) {
        if self.node(id).aggregate_split {
            return;
        }
        let node = self.node_mut(id);
        let (table, table_name) = (node.table, node.table_name.clone());
        let (aggregates, scalars): (Vec<Field>, Vec<Field>) = std::mem::take(&mut node.fields)
            .into_iter()
            .partition(|field| matches!(field, Field::Aggregate { .. }));
        let children = std::mem::take(&mut node.children);
        node.name = aggregate_name;
        node.aggregate_split = true;

        let mut records = QueryNode::new(table, table_name.clone(), records_name);
        records.fields = scalars;
        records.children = children;
        let mut aggregate = QueryNode::new(table, table_name, aggregate_field_name);
        aggregate.fields = aggregates;

        let records = self.add(records);
        let aggregate = self.add(aggregate);
        self.node_mut(id).children = vec![records, aggregate];
    }

    /// Nodes from the root downwards, parents before children
    pub fn walk(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<NodeId> = self.root.into_iter().collect();
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.node(id).children.iter().rev().copied());
        }
        order
    }

    /// Depth of `target` below the root, the root being depth 1
    pub fn depth(&self, target: NodeId) -> Option<usize> {
        fn visit(tree: &QueryTree, id: NodeId, target: NodeId, depth: usize) -> Option<usize> {
            if id == target {
                return Some(depth);
            }
            let node = tree.node(id);
            // the records and aggregate children of a split add no relation hop
            let next = if node.aggregate_split { depth } else { depth + 1 };
            node.children
                .iter()
                .find_map(|child| visit(tree, *child, target, next))
        }
        self.root.and_then(|root| visit(self, root, target, 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_with_split() -> (QueryTree, NodeId) {
        let mut tree = QueryTree::new();
        let mut root = QueryNode::new(0, "movie", "movie");
        root.fields = vec![
            Field::Scalar("title".to_string()),
            Field::Aggregate {
                op: AggregateOp::Count,
                columns: Vec::new(),
                distinct: false,
            },
        ];
        let root = tree.add(root);
        tree.set_root(root);
        let cast = tree.add(QueryNode::new(1, "cast", "casts"));
        tree.attach(root, cast);
        (tree, root)
    }

    #[test]
    fn test_split_aggregate_moves_fields_and_children() {
        let (mut tree, root) = tree_with_split();
        tree.split_aggregate(root, "movie_aggregate".to_string(), "nodes", "aggregate");

        let node = tree.node(root);
        assert!(node.aggregate_split);
        assert_eq!(node.name, "movie_aggregate");
        assert!(node.fields.is_empty());
        assert_eq!(node.children.len(), 2);

        let records = tree.node(node.children[0]);
        assert_eq!(records.name, "nodes");
        assert_eq!(records.fields, vec![Field::Scalar("title".to_string())]);
        assert_eq!(records.children.len(), 1);

        let aggregate = tree.node(node.children[1]);
        assert_eq!(aggregate.name, "aggregate");
        assert_eq!(aggregate.fields.len(), 1);

        assert_eq!(tree.records(root), node.children[0]);
        assert_eq!(tree.relation_children(root).len(), 1);
    }

    #[test]
    fn test_depth_ignores_split_levels() {
        let (mut tree, root) = tree_with_split();
        let cast = tree.node(root).children[0];
        assert_eq!(tree.depth(cast), Some(2));

        tree.split_aggregate(root, "movie_aggregate".to_string(), "nodes", "aggregate");
        assert_eq!(tree.depth(root), Some(1));
        assert_eq!(tree.depth(cast), Some(2));
        assert_eq!(tree.walk().len(), 4);
    }

    fn column(name: &str, operator: &'static str, value: i64) -> Argument {
        Argument::new(
            ArgumentName::Column {
                table: "singer".to_string(),
                name: name.to_string(),
            },
            ArgumentValue::Object(vec![Argument::new(
                ArgumentName::Operator(operator),
                ArgumentValue::Int(value),
            )]),
        )
    }

    fn operators(argument: &Argument) -> Vec<&'static str> {
        match &argument.value {
            ArgumentValue::Object(members) => members
                .iter()
                .filter_map(|member| match member.name {
                    ArgumentName::Operator(operator) => Some(operator),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    #[test]
    fn test_predicates_on_one_column_share_an_object() {
        let merged = merge_conjuncts(vec![column("age", "_gt", 20), column("age", "_lt", 40)]);
        assert_eq!(merged.len(), 1);
        assert_eq!(operators(&merged[0]), vec!["_gt", "_lt"]);
    }

    #[test]
    fn test_repeated_operator_moves_to_and_list() {
        let merged = merge_conjuncts(vec![
            column("age", "_gt", 20),
            Argument::new(
                ArgumentName::And,
                ArgumentValue::Object(vec![column("age", "_gt", 30), column("age", "_lt", 40)]),
            ),
        ]);
        assert_eq!(merged.len(), 2);
        assert_eq!(operators(&merged[0]), vec!["_gt", "_lt"]);
        assert_eq!(merged[1].name, ArgumentName::All);
        assert_eq!(
            merged[1].value,
            ArgumentValue::Object(vec![column("age", "_gt", 30)])
        );
    }

    #[test]
    fn test_negations_never_merge() {
        let mut first = column("age", "_gt", 20);
        first.negated = true;
        let mut second = column("name", "_eq", 1);
        second.negated = true;
        let merged = merge_conjuncts(vec![first.clone(), second.clone()]);
        assert_eq!(
            merged,
            vec![
                first,
                Argument::new(ArgumentName::All, ArgumentValue::Object(vec![second]))
            ]
        );
    }

    #[test]
    fn test_relations_merge_recursively() {
        let merged = merge_conjuncts(vec![
            column("year", "_eq", 2014).through("concert").through("concerts"),
            column("year", "_lt", 2020).through("concert").through("concerts"),
        ]);
        assert_eq!(merged.len(), 1);
        let ArgumentValue::Object(concerts) = &merged[0].value else {
            panic!("expected a relation object");
        };
        assert_eq!(concerts.len(), 1);
        let ArgumentValue::Object(concert) = &concerts[0].value else {
            panic!("expected a relation object");
        };
        assert_eq!(concert.len(), 1);
        assert_eq!(operators(&concert[0]), vec!["_eq", "_lt"]);
    }

    #[test]
    fn test_order_keys_merge_behind_relation() {
        let key = |name: &str, direction: &str| {
            Argument::new(
                ArgumentName::Column {
                    table: "concert".to_string(),
                    name: name.to_string(),
                },
                ArgumentValue::Enum(direction.to_string()),
            )
        };
        let merged = merge_order_keys(vec![
            key("year", "desc").through("concerts"),
            key("theme", "desc").through("concerts"),
            key("year", "asc").through("concerts"),
        ]);
        assert_eq!(
            merged,
            vec![Argument::new(
                ArgumentName::Relation("concerts".to_string()),
                ArgumentValue::Object(vec![key("year", "desc"), key("theme", "desc")]),
            )]
        );
    }

    #[test]
    fn test_through_wraps_in_relation() {
        let argument = Argument::named("x", ArgumentValue::Int(1)).through("director");
        assert_eq!(argument.name, ArgumentName::Relation("director".to_string()));
        assert!(matches!(argument.value, ArgumentValue::Object(ref inner) if inner.len() == 1));
    }
}
