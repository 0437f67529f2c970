use schemars::schema_for;

fn main() {
    let schema = schema_for!(tollgate_common::TollgateConfigStore);
    match serde_json::to_string_pretty(&schema) {
        Ok(json) => println!("{json}"),
        Err(error) => {
            eprintln!("Failed to serialize the config schema: {error}");
            std::process::exit(1);
        }
    }
}
