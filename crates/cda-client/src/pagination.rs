//! Automatic pagination for queries whose `first:` argument exceeds the
//! server's per-request result limit.
//!
//! The rewrite turns the single oversized selection into bounded,
//! synthetically aliased sibling selections (`splitted_<skip>_<name>`), all
//! bundled into one request. [`crate::merge_split_results`] is the inverse:
//! it collapses the aliases back into the original field.

use graphql_parser::query::{
    Definition, Document, Field, Number, OperationDefinition, Selection, SelectionSet, Value,
    VariableDefinition,
};
use serde_json::Map;

use crate::client::{ExecuteQueryOptions, QueryInput, raw_execute_query};
use crate::error::CdaClientError;
use crate::merge::merge_split_results;
use crate::transport::TransportResponse;

pub(crate) const SPLIT_ALIAS_PREFIX: &str = "splitted_";

/// Companion metadata fields (`_allXxxMeta` and friends) must never be
/// split.
const META_FIELD_PREFIX: &str = "_";

type Bindings = Map<String, serde_json::Value>;

/// Traversal-wide accumulator enforcing the single-target invariant and
/// collecting the variables the target consumed.
#[derive(Debug, Default)]
struct SplitAccumulator {
    target_found: bool,
    pruned_variables: Vec<String>,
}

/// A selection whose resolved `first:` exceeds the ceiling.
#[derive(Debug)]
struct PaginationTarget {
    total: i64,
    initial_skip: i64,
    alias_name: String,
    kept_arguments: Vec<(String, Value<'static, String>)>,
    consumed_variables: Vec<String>,
}

/// Rewrite a query so that one oversized collection selection becomes
/// several bounded chunks, and prune the variables the chunks no longer
/// reference.
///
/// Returns the rewritten document together with the pruned variable
/// bindings. Queries without an oversized selection pass through unchanged.
///
/// # Errors
///
/// [`CdaClientError::MultiplePaginationTargets`] if more than one selection
/// is oversized, [`CdaClientError::VariableTypeMismatch`] if a `first`/`skip`
/// variable does not resolve to a number.
pub fn split_oversized_selections(
    mut document: Document<'static, String>,
    mut variables: Bindings,
    ceiling: u32,
) -> Result<(Document<'static, String>, Bindings), CdaClientError> {
    let ceiling = i64::from(ceiling);
    let mut acc = SplitAccumulator::default();

    for definition in &mut document.definitions {
        let selection_set = match definition {
            Definition::Operation(operation) => operation_selection_set_mut(operation),
            Definition::Fragment(fragment) => &mut fragment.selection_set,
        };
        rewrite_selection_set(selection_set, &variables, ceiling, &mut acc)?;
    }

    if !acc.pruned_variables.is_empty() {
        for definition in &mut document.definitions {
            if let Definition::Operation(operation) = definition {
                if let Some(definitions) = variable_definitions_mut(operation) {
                    definitions.retain(|definition| {
                        !acc.pruned_variables.contains(&definition.name)
                    });
                }
            }
        }
        for name in &acc.pruned_variables {
            variables.remove(name);
        }
    }

    Ok((document, variables))
}

fn operation_selection_set_mut<'d>(
    operation: &'d mut OperationDefinition<'static, String>,
) -> &'d mut SelectionSet<'static, String> {
    match operation {
        OperationDefinition::SelectionSet(selection_set) => selection_set,
        OperationDefinition::Query(query) => &mut query.selection_set,
        OperationDefinition::Mutation(mutation) => &mut mutation.selection_set,
        OperationDefinition::Subscription(subscription) => &mut subscription.selection_set,
    }
}

fn variable_definitions_mut<'d>(
    operation: &'d mut OperationDefinition<'static, String>,
) -> Option<&'d mut Vec<VariableDefinition<'static, String>>> {
    match operation {
        OperationDefinition::SelectionSet(_) => None,
        OperationDefinition::Query(query) => Some(&mut query.variable_definitions),
        OperationDefinition::Mutation(mutation) => Some(&mut mutation.variable_definitions),
        OperationDefinition::Subscription(subscription) => {
            Some(&mut subscription.variable_definitions)
        }
    }
}

/// Bottom-up rewrite: children first, so a target nested inside a fragment
/// or inline fragment is detected before the set containing it is rebuilt.
fn rewrite_selection_set(
    selection_set: &mut SelectionSet<'static, String>,
    variables: &Bindings,
    ceiling: i64,
    acc: &mut SplitAccumulator,
) -> Result<(), CdaClientError> {
    for selection in &mut selection_set.items {
        match selection {
            Selection::Field(field) => {
                rewrite_selection_set(&mut field.selection_set, variables, ceiling, acc)?;
            }
            Selection::InlineFragment(fragment) => {
                rewrite_selection_set(&mut fragment.selection_set, variables, ceiling, acc)?;
            }
            Selection::FragmentSpread(_) => {}
        }
    }

    let items = std::mem::take(&mut selection_set.items);
    let mut rebuilt = Vec::with_capacity(items.len());

    for selection in items {
        let target = match &selection {
            Selection::Field(field) => probe_pagination_target(field, variables, ceiling)?,
            _ => None,
        };

        match (target, selection) {
            (Some(target), Selection::Field(field)) => {
                if acc.target_found {
                    return Err(CdaClientError::MultiplePaginationTargets);
                }
                acc.target_found = true;
                acc.pruned_variables
                    .extend(target.consumed_variables.iter().cloned());
                emit_split_chunks(&field, &target, ceiling, &mut rebuilt);
            }
            (_, selection) => rebuilt.push(selection),
        }
    }

    selection_set.items = rebuilt;
    Ok(())
}

/// Decide whether a field selection needs splitting, resolving its
/// `first`/`skip` arguments from literals or variable bindings.
fn probe_pagination_target(
    field: &Field<'static, String>,
    variables: &Bindings,
    ceiling: i64,
) -> Result<Option<PaginationTarget>, CdaClientError> {
    if field.name.starts_with(META_FIELD_PREFIX) {
        return Ok(None);
    }

    let mut first_arg = None;
    let mut skip_arg = None;
    let mut kept_arguments = Vec::new();

    for (name, value) in &field.arguments {
        match name.as_str() {
            "first" => first_arg = Some(value),
            "skip" => skip_arg = Some(value),
            _ => kept_arguments.push((name.clone(), value.clone())),
        }
    }

    let Some(first) = first_arg else {
        return Ok(None);
    };

    let mut consumed_variables = Vec::new();

    let total = match first {
        Value::Int(total) => match total.as_i64() {
            Some(total) => total,
            None => return Ok(None),
        },
        Value::Variable(name) => {
            consumed_variables.push(name.clone());
            resolve_numeric_variable(name, variables)?
        }
        _ => return Ok(None),
    };

    if total <= ceiling {
        return Ok(None);
    }

    let initial_skip = match skip_arg {
        Some(Value::Int(skip)) => skip.as_i64().unwrap_or(0),
        Some(Value::Variable(name)) => {
            consumed_variables.push(name.clone());
            resolve_numeric_variable(name, variables)?
        }
        _ => 0,
    };

    let alias_name = field.alias.clone().unwrap_or_else(|| field.name.clone());

    Ok(Some(PaginationTarget {
        total,
        initial_skip,
        alias_name,
        kept_arguments,
        consumed_variables,
    }))
}

fn resolve_numeric_variable(
    name: &str,
    variables: &Bindings,
) -> Result<i64, CdaClientError> {
    variables
        .get(name)
        .and_then(serde_json::Value::as_i64)
        .ok_or_else(|| CdaClientError::VariableTypeMismatch {
            name: name.to_string(),
        })
}

/// Emit one aliased clone of the target per chunk, ascending skip. The last
/// chunk may be smaller than the ceiling but is never empty.
fn emit_split_chunks(
    field: &Field<'static, String>,
    target: &PaginationTarget,
    ceiling: i64,
    out: &mut Vec<Selection<'static, String>>,
) {
    let mut skip = target.initial_skip;
    while target.total - skip + target.initial_skip > 0 {
        let chunk = (target.total - skip + target.initial_skip).min(ceiling);

        let mut split = field.clone();
        split.alias = Some(format!(
            "{SPLIT_ALIAS_PREFIX}{skip}_{}",
            target.alias_name
        ));
        split.arguments = target.kept_arguments.clone();
        split
            .arguments
            .push(("first".to_string(), int_value(chunk)));
        split.arguments.push(("skip".to_string(), int_value(skip)));

        out.push(Selection::Field(split));
        skip += ceiling;
    }
}

fn int_value(value: i64) -> Value<'static, String> {
    Value::Int(Number::from(i32::try_from(value).unwrap_or(i32::MAX)))
}

/// Execute a query with automatic pagination, returning both the merged
/// result and the raw transport response.
///
/// A textual query is parsed first; the rewritten query is executed once
/// (the server answers every chunk in a single response) and the split
/// aliases are merged back into the shape the caller asked for.
///
/// Only a single selection per query may carry an oversized `first:`
/// argument.
pub async fn raw_execute_query_with_auto_pagination(
    query: impl Into<QueryInput>,
    options: &ExecuteQueryOptions,
) -> Result<(serde_json::Value, TransportResponse), CdaClientError> {
    let document = query.into().into_document()?;
    let bindings = options.variables.clone().unwrap_or_default();
    let had_variables = options.variables.is_some();

    let (document, bindings) =
        split_oversized_selections(document, bindings, options.pagination_ceiling)?;

    let mut options = options.clone();
    options.variables = (had_variables || !bindings.is_empty()).then_some(bindings);

    let (data, response) = raw_execute_query(document, &options).await?;
    Ok((merge_split_results(data), response))
}

/// Execute a query with automatic pagination, returning only the merged
/// result.
pub async fn execute_query_with_auto_pagination(
    query: impl Into<QueryInput>,
    options: &ExecuteQueryOptions,
) -> Result<serde_json::Value, CdaClientError> {
    let (data, _response) = raw_execute_query_with_auto_pagination(query, options).await?;
    Ok(data)
}
