//! Agent scoring and per-team summaries over projected records.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::projection::AgentRecord;
use crate::value::round_to;

pub const DEFAULT_THRESHOLD: f64 = 60.0;
const UNASSIGNED_TEAM: &str = "Unassigned";

const FIXED_WEIGHT: f64 = 0.3;
const CC_WEIGHT: f64 = 0.25;
const SC_WEIGHT: f64 = 0.25;
const UP_WEIGHT: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Category {
    Elite,
    Strong,
    Stable,
    Watch,
    Critical,
}

impl Category {
    pub fn for_score(score: f64) -> Self {
        if score >= 85.0 {
            Category::Elite
        } else if score >= 75.0 {
            Category::Strong
        } else if score >= 65.0 {
            Category::Stable
        } else if score >= 50.0 {
            Category::Watch
        } else {
            Category::Critical
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentScore {
    pub name: String,
    pub score: f64,
    pub category: Category,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamSummary {
    pub team: String,
    pub total_agents: usize,
    pub underperforming_count: usize,
    pub average_score: f64,
    pub agents: Vec<AgentScore>,
}

/// Weighted mean of the percentages the agent has; 0 when it has none.
/// Values below 1 are read as fractions.
pub fn agent_score(agent: &AgentRecord) -> f64 {
    let weighted = [
        (agent.fixed_pct, FIXED_WEIGHT),
        (agent.cc_pct, CC_WEIGHT),
        (agent.sc_pct, SC_WEIGHT),
        (agent.up_pct, UP_WEIGHT),
    ];
    let (sum, weight) = weighted
        .iter()
        .filter_map(|(value, weight)| value.map(|v| (v, *weight)))
        .fold((0.0, 0.0), |(sum, total), (value, weight)| {
            let percent = if value < 1.0 { value * 100.0 } else { value };
            (sum + percent * weight, total + weight)
        });
    if weight > 0.0 {
        sum / weight
    } else {
        0.0
    }
}

/// Group agents by team and summarize each team; agents without a team go
/// to "Unassigned"
pub fn summarize_teams(agents: &BTreeMap<String, AgentRecord>, threshold: f64) -> Vec<TeamSummary> {
    let mut teams: BTreeMap<String, Vec<AgentScore>> = BTreeMap::new();
    for agent in agents.values() {
        let team = if agent.team.is_empty() {
            UNASSIGNED_TEAM.to_string()
        } else {
            agent.team.clone()
        };
        let score = agent_score(agent);
        teams.entry(team).or_default().push(AgentScore {
            name: agent.name.clone(),
            score: round_to(score, 1),
            category: Category::for_score(score),
        });
    }

    teams
        .into_iter()
        .map(|(team, agents)| {
            let total = agents.iter().map(|a| a.score).sum::<f64>();
            TeamSummary {
                team,
                total_agents: agents.len(),
                underperforming_count: agents.iter().filter(|a| a.score < threshold).count(),
                average_score: round_to(total / agents.len() as f64, 1),
                agents,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::MergedAgentRecord;

    fn agent(name: &str, team: &str, fixed: Option<f64>, cc: Option<f64>) -> AgentRecord {
        let mut record = AgentRecord::from(&MergedAgentRecord {
            identity: name.to_string(),
            ..MergedAgentRecord::default()
        });
        record.team = team.to_string();
        record.fixed_pct = fixed;
        record.cc_pct = cc;
        record
    }

    #[test]
    fn test_score_uses_present_metrics_only() {
        // (80 * 0.3 + 60 * 0.25) / 0.55
        let score = agent_score(&agent("A", "T", Some(80.0), Some(60.0)));
        assert!((score - 70.909_090_909).abs() < 1e-6);
        assert_eq!(agent_score(&agent("B", "T", None, None)), 0.0);
    }

    #[test]
    fn test_fractions_lifted_to_percent() {
        let score = agent_score(&agent("A", "T", Some(0.9), None));
        assert!((score - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_categories() {
        assert_eq!(Category::for_score(85.0), Category::Elite);
        assert_eq!(Category::for_score(84.9), Category::Strong);
        assert_eq!(Category::for_score(65.0), Category::Stable);
        assert_eq!(Category::for_score(50.0), Category::Watch);
        assert_eq!(Category::for_score(49.99), Category::Critical);
    }

    #[test]
    fn test_team_summary() {
        let mut agents = BTreeMap::new();
        agents.insert("A".to_string(), agent("A", "T1", Some(90.0), None));
        agents.insert("B".to_string(), agent("B", "T1", Some(40.0), None));
        agents.insert("C".to_string(), agent("C", "", Some(70.0), None));

        let teams = summarize_teams(&agents, DEFAULT_THRESHOLD);
        assert_eq!(teams.len(), 2);
        assert_eq!(teams[0].team, "T1");
        assert_eq!(teams[0].total_agents, 2);
        assert_eq!(teams[0].underperforming_count, 1);
        assert_eq!(teams[0].average_score, 65.0);
        assert_eq!(teams[1].team, "Unassigned");
        assert_eq!(teams[1].agents[0].category, Category::Stable);
    }
}
