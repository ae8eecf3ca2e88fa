//! Subcommand handlers

use std::sync::Arc;

use anyhow::{bail, Result};
use permrs_core::{AffixKind, EntityId, PermissionEngine, TraceNode};
use serde::Serialize;
use uuid::Uuid;

use crate::{Command, ScopeArgs};

/// Parse `group:<name>`, `user:<uuid>` or a bare UUID
fn parse_entity(raw: &str) -> Result<EntityId> {
    if let Some(name) = raw.strip_prefix("group:") {
        return Ok(EntityId::group(name));
    }
    let id = raw.strip_prefix("user:").unwrap_or(raw);
    match Uuid::parse_str(id) {
        Ok(uuid) => Ok(EntityId::user(uuid.to_string())),
        Err(_) if raw.starts_with("user:") => bail!("Invalid player UUID: '{}'", id),
        Err(_) => Ok(EntityId::group(raw)),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn verdict(result: Option<bool>) -> &'static str {
    match result {
        Some(true) => "granted",
        Some(false) => "revoked",
        None => "undefined",
    }
}

fn print_tree(tree: &TraceNode) {
    print!("{}", tree.render());
}

pub fn run(engine: &Arc<PermissionEngine>, command: Command, json: bool) -> Result<()> {
    match command {
        Command::Check {
            entity,
            permission,
            scope,
            debug,
        } => check(engine, &parse_entity(&entity)?, &permission, &scope, debug, json),
        Command::Expr {
            entity,
            expression,
            scope,
        } => {
            let entity = parse_entity(&entity)?;
            let result = engine.has_permission_expression(
                &entity,
                &expression,
                scope.server.as_deref(),
                scope.world.as_deref(),
            )?;
            if json {
                print_json(&serde_json::json!({ "expression": expression, "result": result }))
            } else {
                println!("{}", result);
                Ok(())
            }
        }
        Command::Prefix { entity, debug } => {
            affix(engine, &parse_entity(&entity)?, AffixKind::Prefix, debug, json)
        }
        Command::Suffix { entity, debug } => {
            affix(engine, &parse_entity(&entity)?, AffixKind::Suffix, debug, json)
        }
        Command::List { entity, scope } => {
            let entity = parse_entity(&entity)?;
            let list = engine.effective_permissions(
                &entity,
                scope.server.as_deref(),
                scope.world.as_deref(),
            )?;
            if json {
                return print_json(&*list);
            }
            for (permission, granted) in list.iter() {
                println!("{} {}", if *granted { "+" } else { "-" }, permission);
            }
            Ok(())
        }
        Command::Groups => groups(engine, json),
    }
}

fn check(
    engine: &PermissionEngine,
    entity: &EntityId,
    permission: &str,
    scope: &ScopeArgs,
    debug: bool,
    json: bool,
) -> Result<()> {
    let (server, world) = (scope.server.as_deref(), scope.world.as_deref());

    if debug {
        let report = engine.debug_permission(entity, permission, server, world)?;
        if json {
            return print_json(&report);
        }
        print_tree(&report.tree);
        println!("{}{}", verdict(report.result), if report.conflict { " (conflict)" } else { "" });
        return Ok(());
    }

    let result = engine.has_permission(entity, permission, server, world)?;
    if json {
        print_json(&serde_json::json!({ "permission": permission, "result": result }))
    } else {
        println!("{}", verdict(result));
        Ok(())
    }
}

fn affix(engine: &PermissionEngine, entity: &EntityId, kind: AffixKind, debug: bool, json: bool) -> Result<()> {
    if debug {
        let report = engine.debug_affix(entity, kind)?;
        if json {
            return print_json(&report);
        }
        print_tree(&report.tree);
        println!("{:?}", report.value);
        return Ok(());
    }

    let value = engine.affix(entity, kind)?;
    if json {
        print_json(&serde_json::json!({ "kind": kind.as_str(), "value": value }))
    } else {
        println!("{:?}", value);
        Ok(())
    }
}

#[derive(Serialize)]
struct GroupSummary {
    name: String,
    default: bool,
    inheritances: Vec<String>,
    permissions: usize,
}

fn groups(engine: &PermissionEngine, json: bool) -> Result<()> {
    let snapshot = engine.snapshot()?;
    let summaries: Vec<GroupSummary> = snapshot
        .groups()
        .map(|group| GroupSummary {
            name: group.name().to_string(),
            default: group.is_default,
            inheritances: snapshot
                .parents(group)
                .map(|parent| parent.name().to_string())
                .collect(),
            permissions: group.data.all_permissions().count(),
        })
        .collect();

    if json {
        return print_json(&serde_json::json!({
            "groups": summaries,
            "cycles": snapshot.cycles(),
        }));
    }

    for group in &summaries {
        println!(
            "{}{} ({} permissions){}",
            group.name,
            if group.default { " [default]" } else { "" },
            group.permissions,
            if group.inheritances.is_empty() {
                String::new()
            } else {
                format!(" <- {}", group.inheritances.join(", "))
            }
        );
    }
    for cycle in snapshot.cycles() {
        println!("cycle: {}", cycle.join(" -> "));
    }
    Ok(())
}
