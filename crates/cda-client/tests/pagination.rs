//! Query rewrite tests: chunk emission, alias format, variable pruning and
//! the single-target constraint.

use cda_client::{CdaClientError, split_oversized_selections};
use graphql_parser::query::{
    Definition, Document, OperationDefinition, Selection, Value, parse_query,
};
use serde_json::{Map, json};

fn parse(text: &str) -> Document<'static, String> {
    parse_query::<String>(text)
        .expect("query should parse")
        .into_static()
}

fn bindings(value: serde_json::Value) -> Map<String, serde_json::Value> {
    value.as_object().expect("object").clone()
}

/// Alias, field name, and the resolved `first`/`skip` int arguments of every
/// top-level field of the first operation.
fn top_level_fields(document: &Document<'static, String>) -> Vec<FieldSummary> {
    let Some(Definition::Operation(operation)) = document.definitions.first() else {
        panic!("expected an operation definition");
    };
    let selection_set = match operation {
        OperationDefinition::SelectionSet(selection_set) => selection_set,
        OperationDefinition::Query(query) => &query.selection_set,
        OperationDefinition::Mutation(mutation) => &mutation.selection_set,
        OperationDefinition::Subscription(subscription) => &subscription.selection_set,
    };
    selection_set
        .items
        .iter()
        .map(|selection| {
            let Selection::Field(field) = selection else {
                panic!("expected a field selection");
            };
            FieldSummary {
                alias: field.alias.clone(),
                name: field.name.clone(),
                first: int_argument(field, "first"),
                skip: int_argument(field, "skip"),
                argument_names: field
                    .arguments
                    .iter()
                    .map(|(name, _)| name.clone())
                    .collect(),
            }
        })
        .collect()
}

#[derive(Debug)]
struct FieldSummary {
    alias: Option<String>,
    name: String,
    first: Option<i64>,
    skip: Option<i64>,
    argument_names: Vec<String>,
}

fn int_argument(
    field: &graphql_parser::query::Field<'static, String>,
    name: &str,
) -> Option<i64> {
    field.arguments.iter().find_map(|(arg, value)| {
        if arg == name {
            match value {
                Value::Int(number) => number.as_i64(),
                _ => None,
            }
        } else {
            None
        }
    })
}

fn operation_variable_names(document: &Document<'static, String>) -> Vec<String> {
    let Some(Definition::Operation(OperationDefinition::Query(query))) =
        document.definitions.first()
    else {
        panic!("expected a query operation");
    };
    query
        .variable_definitions
        .iter()
        .map(|definition| definition.name.clone())
        .collect()
}

#[test]
fn splits_oversized_selection_into_ceiling_sized_chunks() {
    let document = parse("query { entries: allSuccessStories(first: 2500, skip: 13) { slug } }");

    let (rewritten, variables) =
        split_oversized_selections(document, Map::new(), 100).expect("rewrite should succeed");

    let fields = top_level_fields(&rewritten);
    assert_eq!(fields.len(), 25);
    assert!(variables.is_empty());

    let mut total = 0;
    for (index, field) in fields.iter().enumerate() {
        let expected_skip = 13 + 100 * index as i64;
        assert_eq!(field.name, "allSuccessStories");
        assert_eq!(
            field.alias.as_deref(),
            Some(format!("splitted_{expected_skip}_entries").as_str())
        );
        assert_eq!(field.skip, Some(expected_skip));
        assert_eq!(field.first, Some(100));
        total += field.first.unwrap();
    }
    assert_eq!(total, 2500);
    assert_eq!(fields.last().unwrap().skip, Some(2413));
}

#[test]
fn last_chunk_may_be_smaller_than_the_ceiling() {
    let document = parse("query { entries: allSuccessStories(skip: 13, first: 526) { slug } }");

    let (rewritten, _variables) =
        split_oversized_selections(document, Map::new(), 100).expect("rewrite should succeed");

    let sizes: Vec<i64> = top_level_fields(&rewritten)
        .iter()
        .map(|field| field.first.unwrap())
        .collect();
    assert_eq!(sizes, vec![100, 100, 100, 100, 100, 26]);
}

#[test]
fn exactly_divisible_totals_emit_no_empty_chunk() {
    let document = parse("query { allPosts(first: 300) { id } }");

    let (rewritten, _variables) =
        split_oversized_selections(document, Map::new(), 100).expect("rewrite should succeed");

    let fields = top_level_fields(&rewritten);
    assert_eq!(fields.len(), 3);
    assert!(fields.iter().all(|field| field.first == Some(100)));
    assert_eq!(
        fields.iter().map(|field| field.skip.unwrap()).collect::<Vec<_>>(),
        vec![0, 100, 200]
    );
}

#[test]
fn chunk_count_matches_ceil_of_total_over_ceiling() {
    for (total, ceiling, expected_chunks, expected_last) in [
        (101_i64, 100_u32, 2_usize, 1_i64),
        (250, 100, 3, 50),
        (1000, 500, 2, 500),
        (501, 500, 2, 1),
    ] {
        let document = parse(&format!("query {{ allPosts(first: {total}) {{ id }} }}"));
        let (rewritten, _variables) = split_oversized_selections(document, Map::new(), ceiling)
            .expect("rewrite should succeed");

        let fields = top_level_fields(&rewritten);
        assert_eq!(fields.len(), expected_chunks, "total {total} ceiling {ceiling}");
        assert_eq!(fields.last().unwrap().first, Some(expected_last));
        let sum: i64 = fields.iter().map(|field| field.first.unwrap()).sum();
        assert_eq!(sum, total);
    }
}

#[test]
fn small_first_passes_through_unmodified() {
    let text = "query { entries: allSuccessStories(first: 50) { slug } }";
    let document = parse(text);
    let variables = bindings(json!({ "other": "foo" }));

    let (rewritten, returned) =
        split_oversized_selections(document, variables.clone(), 100).expect("rewrite");

    assert_eq!(rewritten.to_string(), parse(text).to_string());
    assert_eq!(returned, variables);
}

#[test]
fn selection_without_first_argument_is_ignored() {
    let text = "query { allBlogPosts { slug } }";
    let (rewritten, _variables) =
        split_oversized_selections(parse(text), Map::new(), 100).expect("rewrite");
    assert_eq!(rewritten.to_string(), parse(text).to_string());
}

#[test]
fn meta_fields_are_never_split() {
    let text = "query { _allSuccessStoriesMeta(first: 2500) { count } }";
    let (rewritten, _variables) =
        split_oversized_selections(parse(text), Map::new(), 100).expect("rewrite");
    assert_eq!(rewritten.to_string(), parse(text).to_string());
}

#[test]
fn multiple_oversized_selections_are_rejected() {
    let document = parse(
        "query {
            allBlogPosts(first: 2500) { slug }
            entries: allSuccessStories(first: 2500) { slug }
        }",
    );

    let error = split_oversized_selections(document, Map::new(), 100)
        .expect_err("rewrite should fail");
    assert!(matches!(error, CdaClientError::MultiplePaginationTargets));
}

#[test]
fn variable_first_is_resolved_and_pruned() {
    let document = parse(
        "query BuildSitemapUrls($first: IntType!) {
            entries: allSuccessStories(first: $first) { slug }
        }",
    );
    let variables = bindings(json!({ "first": 250, "other": "foo" }));

    let (rewritten, returned) =
        split_oversized_selections(document, variables, 100).expect("rewrite");

    let fields = top_level_fields(&rewritten);
    assert_eq!(
        fields.iter().map(|field| field.first.unwrap()).collect::<Vec<_>>(),
        vec![100, 100, 50]
    );
    assert_eq!(returned, bindings(json!({ "other": "foo" })));
    assert!(operation_variable_names(&rewritten).is_empty());
}

#[test]
fn small_variable_first_keeps_variables_intact() {
    let document = parse(
        "query BuildSitemapUrls($first: IntType!) {
            entries: allSuccessStories(first: $first) { slug }
        }",
    );
    let variables = bindings(json!({ "first": 50, "other": "foo" }));

    let (rewritten, returned) =
        split_oversized_selections(document, variables.clone(), 100).expect("rewrite");

    assert_eq!(returned, variables);
    assert_eq!(operation_variable_names(&rewritten), vec!["first".to_string()]);
}

#[test]
fn non_numeric_first_variable_is_a_type_mismatch() {
    let document = parse(
        "query($first: IntType!) { entries: allSuccessStories(first: $first) { slug } }",
    );
    let variables = bindings(json!({ "first": "many" }));

    let error =
        split_oversized_selections(document, variables, 100).expect_err("rewrite should fail");
    assert!(
        matches!(error, CdaClientError::VariableTypeMismatch { ref name } if name == "first"),
        "unexpected error: {error:?}"
    );
}

#[test]
fn unbound_first_variable_is_a_type_mismatch() {
    let document = parse(
        "query($first: IntType!) { entries: allSuccessStories(first: $first) { slug } }",
    );

    let error = split_oversized_selections(document, Map::new(), 100)
        .expect_err("rewrite should fail");
    assert!(matches!(error, CdaClientError::VariableTypeMismatch { ref name } if name == "first"));
}

#[test]
fn variable_skip_is_resolved_and_pruned() {
    let document = parse(
        "query($offset: IntType) {
            entries: allSuccessStories(first: 250, skip: $offset) { slug }
        }",
    );
    let variables = bindings(json!({ "offset": 5 }));

    let (rewritten, returned) =
        split_oversized_selections(document, variables, 100).expect("rewrite");

    let skips: Vec<i64> = top_level_fields(&rewritten)
        .iter()
        .map(|field| field.skip.unwrap())
        .collect();
    assert_eq!(skips, vec![5, 105, 205]);
    assert!(returned.is_empty());
    assert!(operation_variable_names(&rewritten).is_empty());
}

#[test]
fn non_numeric_skip_variable_is_a_type_mismatch() {
    let document = parse(
        "query($offset: IntType) {
            entries: allSuccessStories(first: 250, skip: $offset) { slug }
        }",
    );
    let variables = bindings(json!({ "offset": "five" }));

    let error =
        split_oversized_selections(document, variables, 100).expect_err("rewrite should fail");
    assert!(matches!(error, CdaClientError::VariableTypeMismatch { ref name } if name == "offset"));
}

#[test]
fn other_arguments_are_preserved_on_every_chunk() {
    let document = parse(
        r#"query { allPosts(locale: en, filter: { slug: { eq: "x" } }, first: 150) { id } }"#,
    );

    let (rewritten, _variables) =
        split_oversized_selections(document, Map::new(), 100).expect("rewrite");

    for field in top_level_fields(&rewritten) {
        assert_eq!(
            field.argument_names,
            vec![
                "locale".to_string(),
                "filter".to_string(),
                "first".to_string(),
                "skip".to_string()
            ]
        );
    }
}

#[test]
fn oversized_selection_inside_a_fragment_is_split() {
    let document = parse(
        "query { ...postsFragment }
        fragment postsFragment on Query {
            entries: allPosts(first: 250) { id }
        }",
    );

    let (rewritten, _variables) =
        split_oversized_selections(document, Map::new(), 100).expect("rewrite");

    let printed = rewritten.to_string();
    assert!(printed.contains("splitted_0_entries"));
    assert!(printed.contains("splitted_100_entries"));
    assert!(printed.contains("splitted_200_entries"));
}

#[test]
fn fragment_and_operation_targets_together_are_rejected() {
    let document = parse(
        "query { allBlogPosts(first: 2500) { slug } ...postsFragment }
        fragment postsFragment on Query {
            entries: allPosts(first: 250) { id }
        }",
    );

    let error = split_oversized_selections(document, Map::new(), 100)
        .expect_err("rewrite should fail");
    assert!(matches!(error, CdaClientError::MultiplePaginationTargets));
}

#[test]
fn ceiling_of_500_is_honored() {
    let document = parse("query { allPosts(first: 450) { id } }");
    let (rewritten, _variables) =
        split_oversized_selections(document, Map::new(), 500).expect("rewrite");
    assert_eq!(top_level_fields(&rewritten).len(), 1);

    let document = parse("query { allPosts(first: 1200) { id } }");
    let (rewritten, _variables) =
        split_oversized_selections(document, Map::new(), 500).expect("rewrite");
    let fields = top_level_fields(&rewritten);
    assert_eq!(
        fields.iter().map(|field| field.first.unwrap()).collect::<Vec<_>>(),
        vec![500, 500, 200]
    );
}
