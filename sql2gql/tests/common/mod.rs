//! Shared fixtures for integration tests
#![allow(dead_code)]

use serde_json::{json, Value};
use sql2gql::{
    CompileContext, CompileResult, Config, DatasetExample, NonInteractive, RelationResolver,
    RelationalSchema, Result, SchemaSource, TargetTypeGraph,
};

/// A relational schema together with its generated GraphQL schema
pub struct Fixture {
    pub relational: RelationalSchema,
    pub target: TargetTypeGraph,
    pub config: Config,
}

impl Fixture {
    pub fn compile(&self, sql: &Value) -> CompileResult<String> {
        self.compile_with(sql, &NonInteractive)
    }

    pub fn compile_with(&self, sql: &Value, resolver: &dyn RelationResolver) -> CompileResult<String> {
        CompileContext::new(&self.relational, &self.target, &self.config, resolver).compile_value(sql)
    }
}

/// In-memory schema source over the fixtures
pub struct FixtureSource;

impl SchemaSource for FixtureSource {
    fn schema_document(&self, db_id: &str) -> Result<TargetTypeGraph> {
        match db_id {
            "imdb" => Ok(imdb_target()),
            "concert_singer" => Ok(concert_singer_target()),
            other => Err(sql2gql::Error::SchemaMismatch(format!("no schema for '{}'", other))),
        }
    }
}

pub fn scalar(name: &str, type_name: &str) -> Value {
    json!({ "name": name, "isDeprecated": false,
            "type": { "kind": "NON_NULL", "name": null,
                      "ofType": { "kind": "SCALAR", "name": type_name, "ofType": null } } })
}

pub fn object(name: &str, type_name: &str) -> Value {
    json!({ "name": name, "isDeprecated": false,
            "type": { "kind": "OBJECT", "name": type_name, "ofType": null } })
}

pub fn list(name: &str, type_name: &str) -> Value {
    json!({ "name": name, "isDeprecated": false,
            "type": { "kind": "NON_NULL", "name": null,
                      "ofType": { "kind": "LIST", "name": null,
                                  "ofType": { "kind": "NON_NULL", "name": null,
                                              "ofType": { "kind": "OBJECT", "name": type_name, "ofType": null } } } } })
}

fn type_graph(types: Vec<Value>) -> TargetTypeGraph {
    let mut types = types;
    for scalar in ["Int", "String", "Boolean", "numeric"] {
        types.push(json!({ "kind": "SCALAR", "name": scalar, "fields": null }));
    }
    let document = json!({ "data": { "__schema": { "types": types } } });
    TargetTypeGraph::from_json(&document.to_string()).unwrap()
}

/// movie(mid, title, release_year, budget), director(did, name),
/// directed_by(id, msid, did), written_by(id, msid, did)
///
/// Movies reach directors through two bridge tables.
pub fn imdb_relational() -> RelationalSchema {
    RelationalSchema::from_value(json!({
        "db_id": "imdb",
        "column_names": [
            [-1, "*"],
            [0, "mid"], [0, "title"], [0, "release year"], [0, "budget"],
            [1, "did"], [1, "name"],
            [2, "id"], [2, "msid"], [2, "did"],
            [3, "id"], [3, "msid"], [3, "did"]
        ],
        "column_names_original": [
            [-1, "*"],
            [0, "mid"], [0, "title"], [0, "release_year"], [0, "budget"],
            [1, "did"], [1, "name"],
            [2, "id"], [2, "msid"], [2, "did"],
            [3, "id"], [3, "msid"], [3, "did"]
        ],
        "column_types": [
            "text", "number", "text", "number", "number", "number", "text",
            "number", "number", "number", "number", "number", "number"
        ],
        "foreign_keys": [[8, 1], [9, 5], [11, 1], [12, 5]],
        "primary_keys": [1, 5, 7, 10],
        "table_names": ["movie", "director", "directed by", "written by"],
        "table_names_original": ["movie", "director", "directed_by", "written_by"]
    }))
    .unwrap()
}

pub fn imdb_target() -> TargetTypeGraph {
    type_graph(vec![
        json!({ "kind": "OBJECT", "name": "movie", "fields": [
            scalar("mid", "Int"), scalar("title", "String"),
            scalar("release_year", "Int"), scalar("budget", "numeric"),
            list("directed_bies", "directed_by"),
            object("directed_bies_aggregate", "directed_by_aggregate"),
            list("written_bies", "written_by"),
            object("written_bies_aggregate", "written_by_aggregate")
        ] }),
        json!({ "kind": "OBJECT", "name": "director", "fields": [
            scalar("did", "Int"), scalar("name", "String"),
            list("directed_bies", "directed_by"),
            list("written_bies", "written_by")
        ] }),
        json!({ "kind": "OBJECT", "name": "directed_by", "fields": [
            scalar("id", "Int"), scalar("msid", "Int"), scalar("did", "Int"),
            object("movie", "movie"), object("director", "director")
        ] }),
        json!({ "kind": "OBJECT", "name": "written_by", "fields": [
            scalar("id", "Int"), scalar("msid", "Int"), scalar("did", "Int"),
            object("movie", "movie"), object("director", "director")
        ] }),
        json!({ "kind": "OBJECT", "name": "movie_aggregate", "fields": [] }),
        json!({ "kind": "OBJECT", "name": "directed_by_aggregate", "fields": [] }),
        json!({ "kind": "OBJECT", "name": "written_by_aggregate", "fields": [] }),
    ])
}

pub fn imdb() -> Fixture {
    Fixture {
        relational: imdb_relational(),
        target: imdb_target(),
        config: Config::default(),
    }
}

/// The concert_singer database of Spider
///
/// stadium 0: stadium_id 1, location 2, name 3, capacity 4, highest 5, lowest 6, average 7
/// singer 1: singer_id 8, name 9, country 10, song_name 11, song_release_year 12, age 13, is_male 14
/// concert 2: concert_id 15, concert_name 16, theme 17, stadium_id 18, year 19
/// singer_in_concert 3: concert_id 20, singer_id 21
pub fn concert_singer_relational() -> RelationalSchema {
    RelationalSchema::from_value(json!({
        "db_id": "concert_singer",
        "column_names_original": [
            [-1, "*"],
            [0, "Stadium_ID"], [0, "Location"], [0, "Name"], [0, "Capacity"],
            [0, "Highest"], [0, "Lowest"], [0, "Average"],
            [1, "Singer_ID"], [1, "Name"], [1, "Country"], [1, "Song_Name"],
            [1, "Song_release_year"], [1, "Age"], [1, "Is_male"],
            [2, "concert_ID"], [2, "concert_Name"], [2, "Theme"], [2, "Stadium_ID"], [2, "Year"],
            [3, "concert_ID"], [3, "Singer_ID"]
        ],
        "column_types": [
            "text",
            "number", "text", "text", "number", "number", "number", "number",
            "number", "text", "text", "text", "text", "number", "others",
            "number", "text", "text", "text", "text",
            "number", "text"
        ],
        "foreign_keys": [[18, 1], [21, 8], [20, 15]],
        "primary_keys": [1, 8, 15, 20],
        "table_names_original": ["stadium", "singer", "concert", "singer_in_concert"]
    }))
    .unwrap()
}

pub fn concert_singer_target() -> TargetTypeGraph {
    type_graph(vec![
        json!({ "kind": "OBJECT", "name": "stadium", "fields": [
            scalar("stadium_id", "Int"), scalar("location", "String"), scalar("name", "String"),
            scalar("capacity", "Int"), scalar("highest", "Int"), scalar("lowest", "Int"),
            scalar("average", "Int"),
            list("concerts", "concert"), object("concerts_aggregate", "concert_aggregate")
        ] }),
        json!({ "kind": "OBJECT", "name": "singer", "fields": [
            scalar("singer_id", "Int"), scalar("name", "String"), scalar("country", "String"),
            scalar("song_name", "String"), scalar("song_release_year", "String"),
            scalar("age", "Int"), scalar("is_male", "Boolean"),
            list("singer_in_concerts", "singer_in_concert"),
            object("singer_in_concerts_aggregate", "singer_in_concert_aggregate")
        ] }),
        json!({ "kind": "OBJECT", "name": "concert", "fields": [
            scalar("concert_id", "Int"), scalar("concert_name", "String"),
            scalar("theme", "String"), scalar("stadium_id", "String"), scalar("year", "String"),
            object("stadium", "stadium"),
            list("singer_in_concerts", "singer_in_concert"),
            object("singer_in_concerts_aggregate", "singer_in_concert_aggregate")
        ] }),
        json!({ "kind": "OBJECT", "name": "singer_in_concert", "fields": [
            scalar("concert_id", "Int"), scalar("singer_id", "String"),
            object("concert", "concert"), object("singer", "singer")
        ] }),
        json!({ "kind": "OBJECT", "name": "stadium_aggregate", "fields": [] }),
        json!({ "kind": "OBJECT", "name": "singer_aggregate", "fields": [] }),
        json!({ "kind": "OBJECT", "name": "concert_aggregate", "fields": [] }),
        json!({ "kind": "OBJECT", "name": "singer_in_concert_aggregate", "fields": [] }),
    ])
}

pub fn concert_singer() -> Fixture {
    Fixture {
        relational: concert_singer_relational(),
        target: concert_singer_target(),
        config: Config::default(),
    }
}

/// `[agg, [unit_op, [agg, column, distinct], null]]` select item
pub fn item(aggregate: u64, column: u64) -> Value {
    json!([aggregate, [0, [0, column, false], null]])
}

/// `[not, op, value_unit, val1, val2]` condition
pub fn cond(op: u64, column: u64, value: Value) -> Value {
    json!([false, op, [0, [0, column, false], null], value, null])
}

/// An `a.x = b.y` join condition
pub fn join(left: u64, right: u64) -> Value {
    json!([false, 2, [0, [0, left, false], null], [0, right, false], null])
}

/// A complete Spider `sql` object with empty optional clauses
pub fn sql(distinct: bool, items: Vec<Value>, tables: &[u64], conds: Vec<Value>, filter: Vec<Value>) -> Value {
    let units: Vec<_> = tables.iter().map(|t| json!(["table_unit", t])).collect();
    json!({
        "except": null,
        "from": { "conds": conds, "table_units": units },
        "groupBy": [],
        "having": [],
        "intersect": null,
        "limit": null,
        "orderBy": [],
        "select": [distinct, items],
        "union": null,
        "where": filter
    })
}

pub fn example(db_id: &str, question: &str, sql: Value) -> DatasetExample {
    serde_json::from_value(json!({
        "db_id": db_id,
        "query": "",
        "query_toks": [],
        "query_toks_no_value": [],
        "question": question,
        "question_toks": [],
        "sql": sql
    }))
    .unwrap()
}
