//! Thin template-rendering wrapper for the demo application.

use anyhow::anyhow;
use coserv::router::{HandlerResult, Reply};
use coserv::ResponseHandle;
use minijinja::Environment;
use serde_json::{Map, Value};
use std::path::Path;

/// Render `name` from the template root into the response as HTML.
pub fn render(
    response: &ResponseHandle,
    template_root: &str,
    name: &str,
    context: &Map<String, Value>,
) -> HandlerResult {
    let path = Path::new(template_root).join(name);
    let source = std::fs::read_to_string(&path)
        .map_err(|e| anyhow!("template {}: {e}", path.display()))?;
    let mut env = Environment::new();
    env.add_template(name, &source)
        .map_err(|e| anyhow!("template {name}: {e}"))?;
    let html = env
        .get_template(name)
        .and_then(|t| t.render(Value::Object(context.clone())))
        .map_err(|e| anyhow!("template {name}: {e}"))?;

    let mut res = response.lock();
    res.set_header("Content-Type", "text/html");
    res.set_body(html);
    Ok(Reply::Manual)
}
