use serde_json::Value;

/// Render the `daemons` list of a status payload as a table
pub fn render_daemons(payload: &Value) -> String {
    let daemons = payload
        .get("daemons")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    if daemons.is_empty() {
        return "No daemons running\n".to_string();
    }

    let field = |daemon: &Value, name: &str| {
        daemon
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or("-")
            .to_string()
    };

    let mut out = format!("{:<8}  {:<8}  {}\n", "PID", "STATUS", "INFO");
    for daemon in daemons {
        out.push_str(&format!(
            "{:<8}  {:<8}  {}\n",
            field(daemon, "pid"),
            field(daemon, "status"),
            field(daemon, "info")
        ));
    }
    out
}
