use crate::error::Result;
use crate::index::IndexManager;
use crate::mcp::types::{Tool, ToolsCallResult};
use serde::Deserialize;
use serde_json::{json, Value};

/// Get all tool definitions for tools/list
pub fn get_tool_definitions() -> Vec<Tool> {
    vec![Tool {
        name: "search_context".to_string(),
        description: concat!(
            "Search for relevant code context based on a query within a specific project. ",
            "Automatically performs incremental indexing before searching, so results are ",
            "always up to date. Returns formatted text snippets from the codebase that are ",
            "semantically related to the query. ",
            "Use forward slashes (/) as path separators in project_root_path, even on Windows. ",
            "Only pass absolute, trusted paths; paths containing '..' are rejected."
        )
        .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "project_root_path": {
                    "type": "string",
                    "description": "Absolute path to the project root directory. Use forward slashes (/) as separators. Example: C:/Users/username/projects/myproject",
                },
                "query": {
                    "type": "string",
                    "description": "Natural language search query describing the code you are looking for. Examples: 'logging configuration setup', 'user authentication login', 'database connection pool', 'error handling for uploads'. Returns formatted snippets with the file paths where the relevant code lives.",
                },
            },
            "required": ["project_root_path", "query"],
        }),
    }]
}

#[derive(Debug, Deserialize)]
struct SearchContextParams {
    #[serde(default)]
    project_root_path: Option<String>,
    #[serde(default)]
    query: Option<String>,
}

/// Handle a search_context tool call.
///
/// Every outcome is a tool result: failures become `Error: <message>` text
/// with `is_error` set, never a protocol-level error.
pub async fn handle_search_context(
    manager: &IndexManager,
    arguments: &Value,
) -> Result<ToolsCallResult> {
    let params: SearchContextParams = match serde_json::from_value(arguments.clone()) {
        Ok(params) => params,
        Err(e) => {
            return Ok(ToolsCallResult::error(format!(
                "Error: invalid arguments: {}",
                e
            )));
        }
    };

    let Some(project_root) = params.project_root_path.as_deref().map(str::trim).filter(|s| !s.is_empty())
    else {
        return Ok(ToolsCallResult::error(
            "Error: project_root_path is required".to_string(),
        ));
    };
    let Some(query) = params.query.as_deref() else {
        return Ok(ToolsCallResult::error("Error: query is required".to_string()));
    };

    let started = std::time::Instant::now();
    log::info!(
        "search_context invoked for {} with query: {:.100}",
        project_root,
        query
    );

    match manager.search_context(project_root, query).await {
        Ok(text) => {
            log::info!(
                "search_context completed in {:.2}s",
                started.elapsed().as_secs_f64()
            );
            Ok(ToolsCallResult::text(text))
        }
        Err(e) => {
            log::error!("search_context failed: {}", e);
            Ok(ToolsCallResult::error(format!("Error: {}", e)))
        }
    }
}
