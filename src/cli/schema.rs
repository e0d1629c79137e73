//! Schema CLI command

use covgap::*;

pub fn cmd_schema(args: &[String]) -> Result<()> {
    let schema_name = args.first().map(|s| s.as_str()).unwrap_or("list");

    match schema_name {
        "list" => {
            println!("Available schemas: result, config, rules, scenario");
            Ok(())
        }
        "result" => print_schema::<GapAnalysisResult>(),
        "config" => print_schema::<CovgapConfig>(),
        "rules" => print_schema::<Vec<BusinessRule>>(),
        "scenario" => print_schema::<TestScenario>(),
        _ => Err(format!("Unknown schema: {}", schema_name).into()),
    }
}

fn print_schema<T: schemars::JsonSchema>() -> Result<()> {
    let schema = schemars::schema_for!(T);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}
