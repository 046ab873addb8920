pub mod collection;
pub mod error;
pub mod lead_detail;
pub mod leads;
pub mod opportunities;
pub mod optimistic;
pub mod preferences;
pub mod state;
pub mod store;
pub mod types;
pub mod util;
pub mod validation;

use state::{AppConfig, AppState};

/// Rows shown per table in the console summary
const SUMMARY_ROWS: usize = 10;

pub fn run() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match state::config_path().and_then(|path| state::load_config(&path)) {
        Ok(config) => config,
        Err(e) => {
            log::warn!("{}. Falling back to default config.", e);
            AppConfig::default()
        }
    };

    let state = match AppState::new(config) {
        Ok(state) => state,
        Err(e) => {
            log::error!("Failed to start: {}", e);
            std::process::exit(1);
        }
    };

    log::info!("Theme: {}", state.theme().as_str());

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            log::error!("Failed to start async runtime: {}", e);
            std::process::exit(1);
        }
    };

    runtime.block_on(print_summary(&state));
}

async fn print_summary(state: &AppState) {
    let leads = state.leads_view();
    let opportunities = state.opportunities_view();
    let (lead_result, opportunity_result) = tokio::join!(leads.load(), opportunities.load());

    match lead_result {
        Ok(()) => {
            let stats = leads.filter_stats();
            println!("Leads ({} of {})", stats.filtered, stats.total);
            for lead in leads.page(1, SUMMARY_ROWS) {
                println!(
                    "  {:<24} {:<20} {:>3}  {}",
                    util::truncate(&lead.name, 24),
                    util::truncate(&lead.company, 20),
                    lead.score,
                    util::humanize(lead.status.as_str()),
                );
            }
            let counts: Vec<String> = stats
                .status_counts
                .iter()
                .map(|(status, count)| format!("{} {}", util::humanize(status.as_str()), count))
                .collect();
            println!("  {}", counts.join(", "));
        }
        Err(e) => println!("Leads unavailable: {} ({})", e.message, e.recovery_suggestion),
    }

    match opportunity_result {
        Ok(()) => {
            let all = opportunities.opportunities();
            println!("Opportunities ({})", all.len());
            for opp in opportunities.page(1).into_iter().take(SUMMARY_ROWS) {
                println!(
                    "  {:<32} {:<14} {:>14}",
                    util::truncate(&opp.name, 32),
                    util::humanize(opp.stage.as_str()),
                    util::format_amount(opp.amount),
                );
            }
            let won = all
                .iter()
                .filter(|o| o.stage == types::OpportunityStage::ClosedWon)
                .count();
            let win_rate = if all.is_empty() {
                0.0
            } else {
                won as f64 / all.len() as f64
            };
            println!(
                "  Pipeline {}, won {}",
                util::format_currency(opportunities.visible_pipeline()),
                util::format_percentage(win_rate, 0),
            );
        }
        Err(e) => println!(
            "Opportunities unavailable: {} ({})",
            e.message, e.recovery_suggestion
        ),
    }
}
