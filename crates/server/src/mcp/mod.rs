// MCP tool surface: JSON-RPC 2.0 over POST /mcp.
//
// Shares the bearer-auth layer and the artifact store with the REST
// surface; every tool runs the same scope checks and error mapping, so
// the two transports cannot drift apart semantically.

pub mod jsonrpc;

use axum::{
    extract::{Extension, State},
    response::Json,
    routing::post,
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;
use vellum_common::{markdown, types::Metadata, types::Scope};

use crate::{
    auth::middleware::{require_scope, AuthenticatedCaller},
    error::ApiError,
    store::{ArtifactStore, LIST_DEFAULT_LIMIT},
    validation::ValidatedJson,
};

use jsonrpc::{Request, RequestId, Response, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND};

pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Every tool exposed over `tools/list`, in listing order.
pub const TOOL_NAMES: [&str; 12] = [
    "create_artifact",
    "list_artifacts",
    "search_artifacts",
    "get_artifact",
    "update_artifact",
    "str_replace_artifact",
    "str_insert_artifact",
    "delete_artifact",
    "list_artifact_versions",
    "get_artifact_version",
    "restore_artifact_version",
    "diff_artifact_versions",
];

#[derive(Clone)]
struct McpState {
    store: ArtifactStore,
}

pub fn router(store: ArtifactStore) -> Router {
    Router::new().route("/mcp", post(handle_rpc)).with_state(McpState { store })
}

async fn handle_rpc(
    State(state): State<McpState>,
    Extension(caller): Extension<AuthenticatedCaller>,
    ValidatedJson(request): ValidatedJson<Request>,
) -> Json<Response> {
    if request.jsonrpc != "2.0" {
        return Json(Response::error(request.id, INVALID_REQUEST, "jsonrpc must be \"2.0\""));
    }

    let response = match request.method.as_str() {
        "initialize" => Response::success(request.id, initialize_result()),
        "tools/list" => Response::success(request.id, json!({ "tools": tools_manifest() })),
        "tools/call" => handle_tool_call(&state, &caller, request.id, request.params).await,
        other => Response::error(
            request.id,
            METHOD_NOT_FOUND,
            format!("method '{other}' is not supported"),
        ),
    };

    Json(response)
}

fn initialize_result() -> Value {
    json!({
        "protocolVersion": MCP_PROTOCOL_VERSION,
        "capabilities": { "tools": {} },
        "serverInfo": {
            "name": "vellum",
            "version": env!("CARGO_PKG_VERSION"),
        },
    })
}

#[derive(Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

async fn handle_tool_call(
    state: &McpState,
    caller: &AuthenticatedCaller,
    id: RequestId,
    params: Option<Value>,
) -> Response {
    let params: ToolCallParams = match params.map(serde_json::from_value).transpose() {
        Ok(Some(params)) => params,
        Ok(None) => return Response::error(id, INVALID_PARAMS, "tools/call requires params"),
        Err(error) => {
            return Response::error(id, INVALID_PARAMS, format!("invalid tool call params: {error}"))
        }
    };

    let result = match dispatch_tool(state, caller, &params.name, params.arguments).await {
        Ok(value) => tool_result(value),
        Err(ToolError::UnknownTool) => {
            return Response::error(
                id,
                INVALID_PARAMS,
                format!("unknown tool '{}'", params.name),
            )
        }
        Err(ToolError::BadArguments(message)) => tool_error_value(
            &ApiError::new(crate::error::ErrorCode::ValidationFailed, message),
        ),
        Err(ToolError::Api(error)) => tool_error_value(&error),
    };

    Response::success(id, result)
}

enum ToolError {
    UnknownTool,
    BadArguments(String),
    Api(ApiError),
}

impl From<ApiError> for ToolError {
    fn from(error: ApiError) -> Self {
        Self::Api(error)
    }
}

fn parse_args<T: serde::de::DeserializeOwned>(arguments: Value) -> Result<T, ToolError> {
    serde_json::from_value(arguments)
        .map_err(|error| ToolError::BadArguments(format!("invalid tool arguments: {error}")))
}

fn parse_artifact_id(raw: &str) -> Result<Uuid, ToolError> {
    Uuid::parse_str(raw).map_err(|_| {
        ToolError::BadArguments("artifact_id must be a valid UUID".to_string())
    })
}

// ── Tool argument shapes ───────────────────────────────────────────

#[derive(Deserialize)]
struct CreateArgs {
    title: Option<String>,
    content: String,
    metadata: Option<Metadata>,
}

#[derive(Deserialize)]
struct ListArgs {
    limit: Option<usize>,
    offset: Option<usize>,
}

#[derive(Deserialize)]
struct SearchArgs {
    query: String,
}

#[derive(Deserialize)]
struct IdArgs {
    artifact_id: String,
}

#[derive(Deserialize)]
struct UpdateArgs {
    artifact_id: String,
    title: Option<String>,
    content: Option<String>,
    metadata: Option<Metadata>,
}

#[derive(Deserialize)]
struct ReplaceArgs {
    artifact_id: String,
    old_string: String,
    new_string: String,
    #[serde(default)]
    replace_all: bool,
    count: Option<usize>,
}

#[derive(Deserialize)]
struct InsertArgs {
    artifact_id: String,
    line_number: usize,
    text: String,
}

#[derive(Deserialize)]
struct ListVersionsArgs {
    artifact_id: String,
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct VersionArgs {
    artifact_id: String,
    version: i64,
}

#[derive(Deserialize)]
struct DiffArgs {
    artifact_id: String,
    from_version: i64,
    to_version: i64,
}

async fn dispatch_tool(
    state: &McpState,
    caller: &AuthenticatedCaller,
    name: &str,
    arguments: Value,
) -> Result<Value, ToolError> {
    let store = &state.store;
    let user_id = caller.user_id;

    match name {
        "create_artifact" => {
            require_scope(caller, Scope::Write)?;
            let args: CreateArgs = parse_args(arguments)?;
            let artifact = store.create(user_id, args.title, args.content, args.metadata).await?;
            Ok(artifact_summary(&artifact))
        }
        "list_artifacts" => {
            require_scope(caller, Scope::Read)?;
            let args: ListArgs = parse_args(arguments)?;
            let (items, total) = store
                .list(user_id, args.limit.unwrap_or(LIST_DEFAULT_LIMIT), args.offset.unwrap_or(0))
                .await?;
            let items: Vec<Value> = items
                .iter()
                .map(|artifact| {
                    json!({
                        "id": artifact.id,
                        "title": artifact.title,
                        "version": artifact.version,
                        "content_preview": markdown::snippet(&artifact.content),
                        "updated_at": artifact.updated_at,
                    })
                })
                .collect();
            Ok(json!({ "items": items, "total": total }))
        }
        "search_artifacts" => {
            require_scope(caller, Scope::Read)?;
            let args: SearchArgs = parse_args(arguments)?;
            let hits = store.search(user_id, &args.query).await?;
            let items: Vec<Value> = hits
                .iter()
                .map(|hit| {
                    json!({
                        "id": hit.id,
                        "title": hit.title,
                        "content_preview": hit.snippet,
                        "updated_at": hit.updated_at,
                    })
                })
                .collect();
            Ok(json!({ "items": items }))
        }
        "get_artifact" => {
            require_scope(caller, Scope::Read)?;
            let args: IdArgs = parse_args(arguments)?;
            let id = parse_artifact_id(&args.artifact_id)?;
            let artifact = store.get(user_id, id).await?;
            Ok(json!({
                "id": artifact.id,
                "title": artifact.title,
                "content": artifact.content,
                "metadata": artifact.metadata,
                "version": artifact.version,
                "created_at": artifact.created_at,
                "updated_at": artifact.updated_at,
            }))
        }
        "update_artifact" => {
            require_scope(caller, Scope::Write)?;
            let args: UpdateArgs = parse_args(arguments)?;
            let id = parse_artifact_id(&args.artifact_id)?;
            let artifact =
                store.update(user_id, id, args.title, args.content, args.metadata).await?;
            Ok(artifact_summary(&artifact))
        }
        "str_replace_artifact" => {
            require_scope(caller, Scope::Write)?;
            let args: ReplaceArgs = parse_args(arguments)?;
            let id = parse_artifact_id(&args.artifact_id)?;
            let (artifact, replacements) = store
                .string_replace(
                    user_id,
                    id,
                    args.old_string,
                    args.new_string,
                    args.replace_all,
                    args.count,
                )
                .await?;
            let mut summary = artifact_summary(&artifact);
            summary["replacements"] = json!(replacements);
            Ok(summary)
        }
        "str_insert_artifact" => {
            require_scope(caller, Scope::Write)?;
            let args: InsertArgs = parse_args(arguments)?;
            let id = parse_artifact_id(&args.artifact_id)?;
            let artifact = store.string_insert(user_id, id, args.line_number, args.text).await?;
            Ok(artifact_summary(&artifact))
        }
        "delete_artifact" => {
            require_scope(caller, Scope::Delete)?;
            let args: IdArgs = parse_args(arguments)?;
            let id = parse_artifact_id(&args.artifact_id)?;
            store.delete(user_id, id).await?;
            Ok(json!({ "deleted": true, "id": id }))
        }
        "list_artifact_versions" => {
            require_scope(caller, Scope::Read)?;
            let args: ListVersionsArgs = parse_args(arguments)?;
            let id = parse_artifact_id(&args.artifact_id)?;
            let page = store.list_versions(user_id, id, args.limit).await?;
            Ok(json!({
                "versions": page.versions,
                "current_version": page.current_version,
                "total_edit_count": page.total_edit_count,
            }))
        }
        "get_artifact_version" => {
            require_scope(caller, Scope::Read)?;
            let args: VersionArgs = parse_args(arguments)?;
            let id = parse_artifact_id(&args.artifact_id)?;
            let snapshot = store.get_version(user_id, id, args.version).await?;
            Ok(json!(snapshot))
        }
        "restore_artifact_version" => {
            require_scope(caller, Scope::Write)?;
            let args: VersionArgs = parse_args(arguments)?;
            let id = parse_artifact_id(&args.artifact_id)?;
            let artifact = store.restore_version(user_id, id, args.version).await?;
            Ok(artifact_summary(&artifact))
        }
        "diff_artifact_versions" => {
            require_scope(caller, Scope::Read)?;
            let args: DiffArgs = parse_args(arguments)?;
            let id = parse_artifact_id(&args.artifact_id)?;
            let diff = store.diff(user_id, id, args.from_version, args.to_version).await?;
            Ok(json!(diff))
        }
        _ => Err(ToolError::UnknownTool),
    }
}

fn artifact_summary(artifact: &vellum_common::types::Artifact) -> Value {
    json!({
        "id": artifact.id,
        "title": artifact.title,
        "version": artifact.version,
        "updated_at": artifact.updated_at,
    })
}

fn tool_result(value: Value) -> Value {
    json!({
        "content": [{ "type": "text", "text": value.to_string() }],
        "isError": false,
    })
}

fn tool_error_value(error: &ApiError) -> Value {
    let body = json!({ "error": error.message(), "code": error.code().as_str() });
    json!({
        "content": [{ "type": "text", "text": body.to_string() }],
        "isError": true,
        "code": error.code().as_str(),
    })
}

fn tools_manifest() -> Vec<Value> {
    let uuid_property = json!({ "type": "string", "description": "Artifact UUID" });

    vec![
        tool_entry(
            "create_artifact",
            "Create a markdown artifact. Title is derived from the content when omitted.",
            json!({
                "type": "object",
                "properties": {
                    "title": { "type": "string" },
                    "content": { "type": "string" },
                    "metadata": { "type": "object" },
                },
                "required": ["content"],
            }),
        ),
        tool_entry(
            "list_artifacts",
            "List the caller's artifacts, newest first, with content previews.",
            json!({
                "type": "object",
                "properties": {
                    "limit": { "type": "integer" },
                    "offset": { "type": "integer" },
                },
            }),
        ),
        tool_entry(
            "search_artifacts",
            "Case-insensitive substring search over titles and content.",
            json!({
                "type": "object",
                "properties": { "query": { "type": "string" } },
                "required": ["query"],
            }),
        ),
        tool_entry(
            "get_artifact",
            "Fetch one artifact including its full content.",
            json!({
                "type": "object",
                "properties": { "artifact_id": uuid_property },
                "required": ["artifact_id"],
            }),
        ),
        tool_entry(
            "update_artifact",
            "Update title, content, and/or metadata. Content changes record a version snapshot.",
            json!({
                "type": "object",
                "properties": {
                    "artifact_id": uuid_property,
                    "title": { "type": "string" },
                    "content": { "type": "string" },
                    "metadata": { "type": "object" },
                },
                "required": ["artifact_id"],
            }),
        ),
        tool_entry(
            "str_replace_artifact",
            "Replace an exact substring. Without replace_all or count the match must be unique; \
             count replaces up to that many occurrences.",
            json!({
                "type": "object",
                "properties": {
                    "artifact_id": uuid_property,
                    "old_string": { "type": "string" },
                    "new_string": { "type": "string" },
                    "replace_all": { "type": "boolean", "default": false },
                    "count": { "type": "integer", "minimum": 1 },
                },
                "required": ["artifact_id", "old_string", "new_string"],
            }),
        ),
        tool_entry(
            "str_insert_artifact",
            "Insert text as a new line at a 1-based line number (lines + 1 appends).",
            json!({
                "type": "object",
                "properties": {
                    "artifact_id": uuid_property,
                    "line_number": { "type": "integer", "minimum": 1 },
                    "text": { "type": "string" },
                },
                "required": ["artifact_id", "line_number", "text"],
            }),
        ),
        tool_entry(
            "delete_artifact",
            "Permanently delete an artifact and its version history.",
            json!({
                "type": "object",
                "properties": { "artifact_id": uuid_property },
                "required": ["artifact_id"],
            }),
        ),
        tool_entry(
            "list_artifact_versions",
            "List retained version snapshots, newest first (page of at most 10).",
            json!({
                "type": "object",
                "properties": {
                    "artifact_id": uuid_property,
                    "limit": { "type": "integer" },
                },
                "required": ["artifact_id"],
            }),
        ),
        tool_entry(
            "get_artifact_version",
            "Fetch one version snapshot, including the current version.",
            json!({
                "type": "object",
                "properties": {
                    "artifact_id": uuid_property,
                    "version": { "type": "integer" },
                },
                "required": ["artifact_id", "version"],
            }),
        ),
        tool_entry(
            "restore_artifact_version",
            "Restore a prior version by replaying it forward as a new version.",
            json!({
                "type": "object",
                "properties": {
                    "artifact_id": uuid_property,
                    "version": { "type": "integer" },
                },
                "required": ["artifact_id", "version"],
            }),
        ),
        tool_entry(
            "diff_artifact_versions",
            "Summary-level comparison of two versions (titles, lengths, metadata).",
            json!({
                "type": "object",
                "properties": {
                    "artifact_id": uuid_property,
                    "from_version": { "type": "integer" },
                    "to_version": { "type": "integer" },
                },
                "required": ["artifact_id", "from_version", "to_version"],
            }),
        ),
    ]
}

fn tool_entry(name: &str, description: &str, input_schema: Value) -> Value {
    json!({
        "name": name,
        "description": description,
        "inputSchema": input_schema,
    })
}
