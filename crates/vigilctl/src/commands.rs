//! Command handlers for vigilctl.

use crate::rpc_client::RpcClient;
use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use owo_colors::OwoColorize;
use vigil_common::breaker::{CircuitState, InterventionLevel};
use vigil_common::claim::ClaimType;
use vigil_common::grounding::{GroundingOutcome, SkipReason};
use vigil_common::ipc::{Method, ResponseData};
use vigil_common::review::ClaimReview;

const SEP: &str = "------------------------------------------------------------";

pub async fn status(socket: Option<&str>) -> Result<()> {
    let mut client = RpcClient::connect(socket).await?;
    let ResponseData::Status(status) = client.call(Method::Status).await? else {
        bail!("unexpected response to status");
    };

    println!();
    println!("{}", "  Vigil Status".bold());
    println!("{SEP}");
    println!();

    println!("{}", "[DAEMON]".cyan());
    println!("  Version:    v{}", status.version);
    println!(
        "  Uptime:     {}",
        format_duration_secs(status.uptime_seconds)
    );
    let emergency = if status.emergency_mode {
        "ACTIVE".red().bold().to_string()
    } else {
        "off".green().to_string()
    };
    println!("  Emergency:  {}", emergency);
    println!();

    println!("{}", "[SAFEGUARDS]".cyan());
    println!("  Level:      {}", level_str(status.intervention_level));
    let open = if status.open_breakers > 0 {
        status.open_breakers.to_string().red().to_string()
    } else {
        "0".green().to_string()
    };
    println!("  Open:       {}", open);
    println!();

    println!("{}", "[TICKS]".cyan());
    println!("  Today:      {}", status.cognitive_ticks_today);
    println!("  Last:       {}", format_ago(status.last_cognitive_tick));
    println!("{SEP}");
    println!();

    Ok(())
}

pub async fn breakers(socket: Option<&str>) -> Result<()> {
    let mut client = RpcClient::connect(socket).await?;
    let ResponseData::BreakerStates(snapshots) = client.call(Method::GetBreakerStates).await?
    else {
        bail!("unexpected response to breaker query");
    };

    println!();
    println!("{}", "[BREAKERS]".cyan());
    for b in &snapshots {
        let opened = match b.opened_at_epoch_ms {
            Some(ms) => format!("   opened {}", format_epoch_ago(ms)),
            None => String::new(),
        };
        let recovery = if b.auto_recover {
            String::new()
        } else {
            "   acknowledge to close".to_string()
        };
        println!(
            "  {:<20} {}   level {}   {} failures   {} trips{}{}",
            b.name,
            state_str(b.state),
            b.intervention_level,
            b.failure_count,
            b.trips_total,
            opened.dimmed(),
            recovery.dimmed(),
        );
    }
    println!();

    Ok(())
}

pub async fn force_open(socket: Option<&str>, breaker: &str) -> Result<()> {
    let mut client = RpcClient::connect(socket).await?;
    client
        .call(Method::ForceOpen {
            breaker: breaker.to_string(),
        })
        .await?;
    println!("{} {} forced open", "✓".green(), breaker);
    Ok(())
}

pub async fn force_close(socket: Option<&str>, breaker: &str) -> Result<()> {
    let mut client = RpcClient::connect(socket).await?;
    client
        .call(Method::ForceClose {
            breaker: breaker.to_string(),
        })
        .await?;
    println!("{} {} forced closed", "✓".green(), breaker);
    Ok(())
}

pub async fn acknowledge(socket: Option<&str>, breaker: &str) -> Result<()> {
    let mut client = RpcClient::connect(socket).await?;
    client
        .call(Method::Acknowledge {
            breaker: breaker.to_string(),
        })
        .await?;
    println!("{} {} acknowledged and closed", "✓".green(), breaker);
    Ok(())
}

pub async fn tick_state(socket: Option<&str>) -> Result<()> {
    let mut client = RpcClient::connect(socket).await?;
    let ResponseData::TickState(tick) = client.call(Method::GetTickState).await? else {
        bail!("unexpected response to tick query");
    };

    println!();
    println!("{}", "[TICKS]".cyan());
    println!("  System:     {}", format_ago(tick.last_system_tick));
    println!("  Cognitive:  {}", format_ago(tick.last_cognitive_tick));
    println!(
        "  Today:      {} (day {})",
        tick.cognitive_ticks_today, tick.counter_day
    );
    println!("  Lifetime:   {}", tick.cognitive_ticks_total);
    let emergency = if tick.emergency_mode {
        "ACTIVE".red().bold().to_string()
    } else {
        "off".green().to_string()
    };
    println!("  Emergency:  {}", emergency);
    println!();

    Ok(())
}

pub async fn reset_budget(socket: Option<&str>, tool: &str) -> Result<()> {
    let mut client = RpcClient::connect(socket).await?;
    client
        .call(Method::ResetGroundingBudget {
            tool: tool.to_string(),
        })
        .await?;
    println!(
        "{} current-period budget counters cleared for {}",
        "✓".green(),
        tool
    );
    Ok(())
}

pub async fn submit(
    socket: Option<&str>,
    belief: String,
    premise: String,
    text: String,
    claim_type: ClaimType,
) -> Result<()> {
    let mut client = RpcClient::connect(socket).await?;
    let ResponseData::Submitted {
        claim_id,
        queue_depth,
    } = client
        .call(Method::SubmitClaim {
            belief_key: belief,
            premise,
            text,
            claim_type,
        })
        .await?
    else {
        bail!("unexpected response to submit");
    };

    println!(
        "{} claim {} queued ({} waiting)",
        "✓".green(),
        claim_id.to_string().cyan(),
        queue_depth
    );
    Ok(())
}

pub async fn reviews(socket: Option<&str>, limit: usize) -> Result<()> {
    let mut client = RpcClient::connect(socket).await?;
    let ResponseData::Reviews(reviews) = client.call(Method::RecentReviews).await? else {
        bail!("unexpected response to reviews query");
    };

    println!();
    println!("{}", "[REVIEWS]".cyan());
    if reviews.is_empty() {
        println!("  {}", "(none yet)".dimmed());
        println!();
        return Ok(());
    }

    for review in reviews.iter().take(limit) {
        let time = review.reviewed_at.format("%H:%M:%S");
        println!(
            "  {}  {:<18} {:<24} {:.2} -> {:.2}  {}",
            time.to_string().dimmed(),
            review.claim_type.as_str(),
            review.belief_key,
            review.initial.value,
            review.final_score.value,
            grounding_str(review),
        );
    }
    println!();

    Ok(())
}

pub async fn respond(socket: Option<&str>, query: &str) -> Result<()> {
    let mut client = RpcClient::connect(socket).await?;
    let ResponseData::Answer(answer) = client
        .call(Method::Respond {
            query: query.to_string(),
        })
        .await?
    else {
        bail!("unexpected response to respond");
    };

    println!();
    println!("{}", answer);
    println!();
    Ok(())
}

pub async fn config(socket: Option<&str>) -> Result<()> {
    let mut client = RpcClient::connect(socket).await?;
    let ResponseData::Config(cfg) = client.call(Method::GetConfig).await? else {
        bail!("unexpected response to config query");
    };
    print!("{}", toml::to_string_pretty(&*cfg)?);
    Ok(())
}

pub async fn metrics(socket: Option<&str>) -> Result<()> {
    let mut client = RpcClient::connect(socket).await?;
    let ResponseData::Metrics(text) = client.call(Method::Metrics).await? else {
        bail!("unexpected response to metrics query");
    };
    print!("{text}");
    Ok(())
}

fn level_str(level: InterventionLevel) -> String {
    match level {
        InterventionLevel::None => "none".green().to_string(),
        InterventionLevel::Dampen => "dampen".yellow().to_string(),
        InterventionLevel::Pause => "pause".yellow().to_string(),
        InterventionLevel::Reset => "reset".red().to_string(),
        InterventionLevel::Hibernate => "hibernate".red().bold().to_string(),
    }
}

fn state_str(state: CircuitState) -> String {
    match state {
        CircuitState::Closed => "closed   ".green().to_string(),
        CircuitState::Open => "open     ".red().to_string(),
        CircuitState::HalfOpen => "half_open".yellow().to_string(),
    }
}

fn grounding_str(review: &ClaimReview) -> String {
    match &review.grounding {
        GroundingOutcome::Completed(r) if r.succeeded() => {
            format!("grounded ({})", r.tool).green().to_string()
        }
        GroundingOutcome::Completed(r) => format!("failed ({})", r.tool).red().to_string(),
        GroundingOutcome::Skipped { reason } => match reason {
            SkipReason::PolicyNever => "skipped (policy)".dimmed().to_string(),
            SkipReason::SampledOut => "skipped (sampled out)".dimmed().to_string(),
            SkipReason::BudgetExhausted => "skipped (budget)".yellow().to_string(),
        },
    }
}

fn format_duration_secs(secs: u64) -> String {
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}

fn format_ago(at: Option<DateTime<Utc>>) -> String {
    match at {
        Some(t) => {
            let secs = (Utc::now() - t).num_seconds().max(0) as u64;
            format!("{} ago", format_duration_secs(secs))
        }
        None => "never".dimmed().to_string(),
    }
}

fn format_epoch_ago(epoch_ms: u64) -> String {
    let now_ms = Utc::now().timestamp_millis().max(0) as u64;
    let secs = now_ms.saturating_sub(epoch_ms) / 1000;
    format!("{} ago", format_duration_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_tiers() {
        assert_eq!(format_duration_secs(42), "42s");
        assert_eq!(format_duration_secs(90), "1m 30s");
        assert_eq!(format_duration_secs(3_700), "1h 1m");
        assert_eq!(format_duration_secs(90_000), "1d 1h");
    }

    #[test]
    fn test_ago_never_goes_negative() {
        let future = Utc::now() + chrono::Duration::seconds(30);
        assert_eq!(format_ago(Some(future)), "0s ago");
    }
}
