use super::{
    colorize_outcome, ensure_prereqs, json_pretty, load_project, make_engine, spin_fail, spin_ok,
    spinner, EXIT_SUCCESS,
};
use std::path::Path;

pub fn run(config: &Path, backend: Option<&str>, json: bool) -> Result<u8, String> {
    let project = load_project(config)?;
    ensure_prereqs(&project, backend, true)?;
    let engine = make_engine(&project, backend)?;

    let pb = (!json).then(|| spinner("resolving snapshot..."));
    let result = engine.provision_detailed(&project.set);
    let provisioned = match result {
        Ok(p) => {
            if let Some(pb) = &pb {
                spin_ok(pb, &format!("snapshot {}", p.snapshot));
            }
            p
        }
        Err(e) => {
            if let Some(pb) = &pb {
                spin_fail(pb, "provisioning failed");
            }
            return Err(e.to_string());
        }
    };

    if json {
        println!("{}", json_pretty(&provisioned)?);
    } else {
        let conn = &provisioned.connection;
        println!(
            "outcome:   {}",
            colorize_outcome(provisioned.outcome.as_str())
        );
        println!("address:   {}", conn.address);
        println!("database:  {}", conn.database);
        println!("user:      {}", conn.user);
        println!("password:  {}", conn.password);
        println!("schema:    {}", conn.schema.as_deref().unwrap_or("(default)"));
    }
    Ok(EXIT_SUCCESS)
}
