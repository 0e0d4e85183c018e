//! Built-in pattern-substitution processors for the standard delivery
//! sequence.
//!
//! Each processor reads a small, documented payload shape and produces the
//! next one. They are deliberately simple generators, not language
//! understanding: a source document is scanned with a regex, everything
//! downstream is template substitution.

use super::StageProcessor;
use crate::errors::PipelineError;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Key for the source-document processor.
pub const DOC_PROCESSOR: &str = "doc_processor";
/// Key for the API action generator.
pub const API_GENERATOR: &str = "api_generator";
/// Key for the interface source generator.
pub const INTERFACE_GENERATOR: &str = "interface_generator";
/// Key for the validation schema generator.
pub const VALIDATION_SCHEMA_GENERATOR: &str = "validation_schema_generator";
/// Key for the storage schema generator.
pub const STORAGE_SCHEMA_GENERATOR: &str = "storage_schema_generator";

/// Returns one instance of every built-in processor.
#[must_use]
pub fn all() -> Vec<Arc<dyn StageProcessor>> {
    vec![
        Arc::new(DocProcessor::new()),
        Arc::new(ApiActionGenerator),
        Arc::new(InterfaceSpecGenerator),
        Arc::new(ValidationSchemaGenerator),
        Arc::new(StorageSchemaGenerator),
    ]
}

fn missing(key: &str, field: &str) -> PipelineError {
    PipelineError::processing(key, format!("input is missing required field '{field}'"))
}

fn entities_of<'a>(key: &str, input: &'a Value) -> Result<&'a Vec<Value>, PipelineError> {
    let entities = input
        .get("entities")
        .and_then(Value::as_array)
        .ok_or_else(|| missing(key, "entities"))?;
    if entities.is_empty() {
        return Err(PipelineError::processing(key, "entity list is empty"));
    }
    Ok(entities)
}

fn entity_parts(key: &str, entity: &Value) -> Result<(String, Vec<String>), PipelineError> {
    let name = entity
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| missing(key, "entities[].name"))?;
    let fields = entity
        .get("fields")
        .and_then(Value::as_array)
        .ok_or_else(|| missing(key, "entities[].fields"))?
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect();
    Ok((name.to_string(), fields))
}

/// Extracts domain entities from a source document body.
///
/// Recognizes sentences of the form `"A User has a name, an email and a
/// role."` — the capitalized subject becomes an entity, the listed nouns its
/// fields.
#[derive(Debug)]
pub struct DocProcessor {
    entity_pattern: Regex,
}

impl DocProcessor {
    /// Creates the processor with its extraction pattern compiled.
    // Fixed pattern, compiles for any input.
    #[allow(clippy::unwrap_used)]
    #[must_use]
    pub fn new() -> Self {
        Self {
            entity_pattern: Regex::new(r"\b([A-Z][A-Za-z]+) has ([^.]+)\.").unwrap(),
        }
    }

    fn split_fields(list: &str) -> Vec<String> {
        list.split(&[',', ';'][..])
            .flat_map(|part| part.split(" and "))
            .map(|raw| {
                raw.trim()
                    .trim_start_matches("an ")
                    .trim_start_matches("a ")
                    .trim()
                    .to_string()
            })
            .filter(|f| !f.is_empty())
            .collect()
    }
}

impl Default for DocProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl StageProcessor for DocProcessor {
    fn key(&self) -> &str {
        DOC_PROCESSOR
    }

    async fn process(&self, input: &Value) -> Result<Value, PipelineError> {
        let body = input
            .get("body")
            .and_then(Value::as_str)
            .ok_or_else(|| missing(DOC_PROCESSOR, "body"))?;
        let title = input.get("title").and_then(Value::as_str).unwrap_or("Untitled");

        let entities: Vec<Value> = self
            .entity_pattern
            .captures_iter(body)
            .map(|cap| {
                json!({
                    "name": &cap[1],
                    "fields": Self::split_fields(&cap[2]),
                })
            })
            .collect();

        if entities.is_empty() {
            return Err(PipelineError::processing(
                DOC_PROCESSOR,
                "no domain entities found in document body",
            ));
        }

        Ok(json!({
            "source_title": title,
            "entities": entities,
        }))
    }
}

/// Generates CRUD API actions from a domain model.
#[derive(Debug, Default)]
pub struct ApiActionGenerator;

#[async_trait::async_trait]
impl StageProcessor for ApiActionGenerator {
    fn key(&self) -> &str {
        API_GENERATOR
    }

    async fn process(&self, input: &Value) -> Result<Value, PipelineError> {
        let entities = entities_of(API_GENERATOR, input)?;

        let mut actions = Vec::new();
        for entity in entities {
            let (name, _) = entity_parts(API_GENERATOR, entity)?;
            let lower = name.to_lowercase();
            let path = format!("/{lower}s");
            let item_path = format!("/{lower}s/{{id}}");
            actions.push(json!({"name": format!("create_{lower}"), "method": "POST", "path": path, "entity": name}));
            actions.push(json!({"name": format!("list_{lower}s"), "method": "GET", "path": path, "entity": name}));
            actions.push(json!({"name": format!("get_{lower}"), "method": "GET", "path": item_path, "entity": name}));
            actions.push(json!({"name": format!("update_{lower}"), "method": "PATCH", "path": item_path, "entity": name}));
            actions.push(json!({"name": format!("delete_{lower}"), "method": "DELETE", "path": item_path, "entity": name}));
        }

        Ok(json!({
            "entities": entities,
            "actions": actions,
        }))
    }
}

/// Renders an interface definition source from an API spec.
#[derive(Debug, Default)]
pub struct InterfaceSpecGenerator;

#[async_trait::async_trait]
impl StageProcessor for InterfaceSpecGenerator {
    fn key(&self) -> &str {
        INTERFACE_GENERATOR
    }

    async fn process(&self, input: &Value) -> Result<Value, PipelineError> {
        let entities = entities_of(INTERFACE_GENERATOR, input)?;
        let actions = input
            .get("actions")
            .and_then(Value::as_array)
            .ok_or_else(|| missing(INTERFACE_GENERATOR, "actions"))?;

        let mut source = String::new();
        for entity in entities {
            let (name, fields) = entity_parts(INTERFACE_GENERATOR, entity)?;
            source.push_str(&format!("model {name} {{\n"));
            source.push_str("  id: string;\n");
            for field in fields {
                source.push_str(&format!("  {field}: string;\n"));
            }
            source.push_str("}\n\n");
        }
        for action in actions {
            let name = action
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| missing(INTERFACE_GENERATOR, "actions[].name"))?;
            let entity = action.get("entity").and_then(Value::as_str).unwrap_or("void");
            source.push_str(&format!("op {name}(): {entity};\n"));
        }

        Ok(json!({
            "models": entities,
            "source": source,
        }))
    }
}

/// Generates validation schema declarations from an interface spec.
#[derive(Debug, Default)]
pub struct ValidationSchemaGenerator;

#[async_trait::async_trait]
impl StageProcessor for ValidationSchemaGenerator {
    fn key(&self) -> &str {
        VALIDATION_SCHEMA_GENERATOR
    }

    async fn process(&self, input: &Value) -> Result<Value, PipelineError> {
        let models = input
            .get("models")
            .and_then(Value::as_array)
            .ok_or_else(|| missing(VALIDATION_SCHEMA_GENERATOR, "models"))?;
        if models.is_empty() {
            return Err(PipelineError::processing(
                VALIDATION_SCHEMA_GENERATOR,
                "model list is empty",
            ));
        }

        let mut schemas = Map::new();
        for model in models {
            let (name, fields) = entity_parts(VALIDATION_SCHEMA_GENERATOR, model)?;
            let mut body = String::from("id: z.string().uuid()");
            for field in fields {
                body.push_str(&format!(", {field}: z.string()"));
            }
            schemas.insert(name, Value::String(format!("z.object({{ {body} }})")));
        }

        Ok(json!({
            "models": models,
            "schemas": schemas,
        }))
    }
}

/// Generates storage DDL from a validation schema's model list.
#[derive(Debug, Default)]
pub struct StorageSchemaGenerator;

#[async_trait::async_trait]
impl StageProcessor for StorageSchemaGenerator {
    fn key(&self) -> &str {
        STORAGE_SCHEMA_GENERATOR
    }

    async fn process(&self, input: &Value) -> Result<Value, PipelineError> {
        let models = input
            .get("models")
            .and_then(Value::as_array)
            .ok_or_else(|| missing(STORAGE_SCHEMA_GENERATOR, "models"))?;
        if models.is_empty() {
            return Err(PipelineError::processing(
                STORAGE_SCHEMA_GENERATOR,
                "model list is empty",
            ));
        }

        let mut tables = Map::new();
        for model in models {
            let (name, fields) = entity_parts(STORAGE_SCHEMA_GENERATOR, model)?;
            let table = format!("{}s", name.to_lowercase());
            let mut ddl = format!("CREATE TABLE {table} (\n  id uuid PRIMARY KEY");
            for field in fields {
                ddl.push_str(&format!(",\n  {} text", field.replace(' ', "_")));
            }
            ddl.push_str("\n);");
            tables.insert(table, Value::String(ddl));
        }

        Ok(json!({ "tables": tables }))
    }
}
