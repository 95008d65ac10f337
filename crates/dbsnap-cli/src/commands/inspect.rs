use super::{ensure_prereqs, json_pretty, load_project, make_engine, EXIT_SUCCESS};
use std::path::Path;

pub fn run(config: &Path, backend: Option<&str>, json: bool) -> Result<u8, String> {
    let project = load_project(config)?;
    ensure_prereqs(&project, backend, false)?;
    let engine = make_engine(&project, backend)?;
    let inspection = engine.inspect(&project.set).map_err(|e| e.to_string())?;

    if json {
        println!("{}", json_pretty(&inspection)?);
        return Ok(EXIT_SUCCESS);
    }

    println!("snapshot:  {}", inspection.snapshot);
    match &inspection.record {
        Some(record) => {
            println!("status:    published");
            println!("id:        {}", record.id);
            let created = record
                .created
                .map_or_else(|| "unknown".to_owned(), |c| c.to_rfc3339());
            println!("created:   {created}");
            for (key, value) in &record.labels {
                println!("label:     {key}={value}");
            }
        }
        None => println!("status:    not built"),
    }
    Ok(EXIT_SUCCESS)
}
