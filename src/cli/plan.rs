use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tabled::Table;

use crate::{
    Res,
    config::Settings,
    info,
    planner::Planner,
    success,
    types::{Plan, PlanTableRow, Popularity},
};

/// Runs the planner chain on `prompt` and prints the resulting plan.
///
/// No Spotify login is needed; this only exercises the providers.
pub async fn plan(settings: &Settings, prompt: &str, count: Option<u32>) -> Res<()> {
    let planner = Planner::from_settings(&settings.planner, reqwest::Client::new());
    info!("Configured planners: {}", planner.configured().join(", "));

    let pb = ProgressBar::new_spinner();
    pb.set_message("Planning...");
    pb.enable_steady_tick(Duration::from_millis(100));
    if let Ok(style) = ProgressStyle::with_template("{spinner:.blue} {msg}") {
        pb.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
    }

    let result = planner.propose_plan(prompt, count).await;
    pb.finish_and_clear();
    let proposed = result?;

    success!("Plan from {}", proposed.source);
    println!("{}", Table::new(plan_rows(&proposed.plan)));
    Ok(())
}

fn plan_rows(plan: &Plan) -> Vec<PlanTableRow> {
    fn join<'a>(items: impl IntoIterator<Item = &'a String>) -> String {
        items.into_iter().cloned().collect::<Vec<_>>().join(", ")
    }

    let popularity = match plan.popularity {
        Popularity::Mainstream => "mainstream",
        Popularity::Niche => "niche",
        Popularity::Mixed => "mixed",
    };

    [
        ("target count", plan.target_count.to_string()),
        ("popularity", popularity.to_string()),
        ("include artists", join(&plan.include_artists)),
        ("include genres", join(&plan.include_genres)),
        ("include tracks", join(&plan.include_tracks)),
        ("keywords", join(&plan.keywords)),
        ("exclude artists", join(&plan.exclude_artists)),
        ("exclude genres", join(&plan.exclude_genres)),
        ("exclude tracks", join(&plan.exclude_tracks)),
    ]
    .into_iter()
    .map(|(field, values)| PlanTableRow {
        field: field.to_string(),
        values,
    })
    .collect()
}
