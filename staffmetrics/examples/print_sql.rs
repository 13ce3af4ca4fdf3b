use std::{env, fs, path::PathBuf};

use staffmetrics::{
    buckets::BucketRule, query_builder::QueryPlanner, registry::Registry, AnalysisQuery,
    AnalysisRequest,
};

fn usage() {
    eprintln!("Usage: print_sql <request_json>");
    eprintln!(
        "Example request: {{\"metric\": \"median_salary\", \"group_by\": \"work_country\", \
         \"filters\": {{\"department\": \"IT,Sales\"}}, \"snapshot_date\": \"2025-01-01\"}}"
    );
}

fn main() -> anyhow::Result<()> {
    let mut args = env::args().skip(1).collect::<Vec<_>>();
    if args.is_empty() {
        usage();
        std::process::exit(1);
    }

    let request_path = PathBuf::from(args.remove(0));
    let query: AnalysisQuery = serde_json::from_str(&fs::read_to_string(request_path)?)?;
    let request = AnalysisRequest::try_from(query)?;

    let planner = QueryPlanner::new(Registry::global(), "employees");
    let planned = planner.plan(&request, &BucketRule::default_age())?;
    println!("{}", planned.sql);
    println!("-- params: {}", serde_json::to_string(&planned.params)?);
    if planned.reducer.is_some() {
        println!("-- rows are reduced after fetch");
    }
    Ok(())
}
