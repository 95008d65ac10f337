use super::{json_pretty, load_project, make_engine, EXIT_SUCCESS};
use std::path::Path;

pub fn run(config: &Path, backend: Option<&str>, json: bool) -> Result<u8, String> {
    let project = load_project(config)?;
    let engine = make_engine(&project, backend)?;
    let snapshot = engine.fingerprint(&project.set).map_err(|e| e.to_string())?;
    if json {
        let payload = serde_json::json!({
            "name": snapshot.name,
            "tag": snapshot.tag.as_str(),
            "reference": snapshot.to_string(),
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("{}", snapshot.tag);
    }
    Ok(EXIT_SUCCESS)
}
