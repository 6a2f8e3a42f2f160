//! Plain-text rendering for the CLI.

use std::fmt::Write;

use riskwrapped::dashboard::UserDashboard;
use riskwrapped::{
    Collection, HealthStatus, OrgTree, PartialLoadError, Risk, Scoped, ScopedBundle, ScopedView,
    Summary, User,
};

/// Indented hierarchy, one node per line.
pub fn tree(tree: &OrgTree) -> String {
    let mut out = String::new();
    for (depth, node) in tree.preorder() {
        let _ = writeln!(out, "{}{} [{}]", "  ".repeat(depth), node.name, node.id);
    }
    out
}

pub fn view(name: &str, view: &ScopedView) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} ({})", name, view.scope);
    out.push_str(&bundle(&view.bundle, &view.summary));
    out
}

pub fn user_dashboard(dashboard: &UserDashboard) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} <{}> ({})",
        dashboard.user.username, dashboard.user.email, dashboard.scope
    );
    out.push_str(&bundle(&dashboard.bundle, &dashboard.summary));
    out
}

fn bundle(bundle: &ScopedBundle, summary: &Summary) -> String {
    let mut out = String::new();

    let _ = writeln!(
        out,
        "\nIncidents: {}  Risks: {}  Actions: {}  Financial loss: {}",
        summary.incident_count, summary.risk_count, summary.action_count, summary.financial_loss
    );
    if summary.orphans.total() > 0 {
        let _ = writeln!(
            out,
            "Unassigned to a known node: {} risks, {} incidents, {} actions, {} insights",
            summary.orphans.risks,
            summary.orphans.incidents,
            summary.orphans.actions,
            summary.orphans.insights
        );
    }

    if summary.per_node.len() > 1 {
        let _ = writeln!(out, "\nBy node:");
        for (node, tally) in &summary.per_node {
            let _ = writeln!(
                out,
                "  [{}] risks {}, incidents {}, actions {}",
                node, tally.risks, tally.incidents, tally.actions
            );
        }
    }

    let _ = writeln!(out, "\nRisks ({}):", bundle.risk_scope);
    section(&mut out, &bundle.risks, |r| r.title.clone());

    let _ = writeln!(out, "\nIncidents:");
    section(&mut out, &bundle.incidents, |i| match i.financial_loss() {
        Some(loss) => format!("{} (loss {})", i.name, loss),
        None => i.name.clone(),
    });

    let _ = writeln!(out, "\nActions:");
    section(&mut out, &bundle.actions, |a| match &a.status {
        Some(status) => format!("{} [{}]", a.description, status),
        None => a.description.clone(),
    });

    let _ = writeln!(out, "\nInsights:");
    if summary.insight_texts.is_empty() {
        let _ = writeln!(out, "  (none)");
    }
    for text in &summary.insight_texts {
        let _ = writeln!(out, "  {}", text);
    }

    out
}

fn section<T>(out: &mut String, records: &[Scoped<T>], line: impl Fn(&T) -> String) {
    if records.is_empty() {
        let _ = writeln!(out, "  (none)");
    }
    for scoped in records {
        let marker = if scoped.orphaned { " (unknown node)" } else { "" };
        let _ = writeln!(out, "  - {}{}", line(&scoped.record), marker);
    }
}

pub fn risk(risk: &Risk) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} [{}]", risk.title, risk.id);
    if let Some(description) = &risk.description {
        let _ = writeln!(out, "  {}", description);
    }
    let node = risk
        .node_id
        .map_or_else(|| "unassigned".to_string(), |n| n.to_string());
    let _ = writeln!(out, "  node: {}", node);
    if let Some(risk_type) = &risk.risk_type {
        let _ = writeln!(out, "  type: {}", risk_type);
    }
    if let Some(status) = &risk.status {
        let _ = writeln!(out, "  status: {}", status);
    }
    if let Some(score) = risk.score {
        let _ = writeln!(out, "  score: {:.1}", score);
    }
    if let Some(created_at) = risk.created_at {
        let _ = writeln!(out, "  created: {}", created_at.format("%Y-%m-%d %H:%M"));
    }
    out
}

pub fn user(user: &User) -> String {
    format!(
        "{} <{}> role={} node={}\n",
        user.username,
        user.email,
        user.role.as_deref().unwrap_or("-"),
        user.node_id
    )
}

pub fn health(health: &HealthStatus) -> String {
    let status = |ok: bool| if ok { "ok" } else { "down" };
    format!("db: {}\nai: {}\n", status(health.db), status(health.ai))
}

/// Per-section load status for a partially failed fetch.
pub fn partial_load(err: &PartialLoadError) -> String {
    let mut out = String::new();
    for collection in Collection::ALL {
        let status = match err.failures.iter().find(|(c, _)| *c == collection) {
            Some((_, e)) => format!("failed to load ({})", e),
            None => "ok".to_string(),
        };
        let _ = writeln!(out, "  {}: {}", collection, status);
    }
    out
}
