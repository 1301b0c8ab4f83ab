/// Normalizes a handful of common tool aliases to their canonical MCP tool
/// name before dispatch (§4.7 step 3). Anything unrecognized passes through
/// unchanged.
pub fn normalize_tool_alias(tool: &str) -> &str {
    match tool {
        "ls" => "fs.list_dir",
        "list_files" => "fs.list_dir",
        "cat" => "fs.read_text",
        other => other,
    }
}
