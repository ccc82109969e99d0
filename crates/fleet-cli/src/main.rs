use std::process::exit;
use std::time::Duration;

use fleet_core::{IngestError, IngestOutcome, StoreError};
use fleet_domain::{Fqdn, HostState};
use fleet_ledger::Ledger;
use serde::Serialize;
use serde_json::json;

const USAGE: &str = "Uso: fleet <comando> [opciones]
  ingest <archivo>...             ingesta síncrona
  enqueue <archivo>...            ingesta vía cola de workers
  prune [--days <N>]              retención por edad de reportes
  compact                         compacta reportes unchanged
  orphans mark [--secs <N>]       marca hosts sin reportes recientes
  orphans purge [--days <N>]      purga hosts huérfanos no fijados
  history prune [--retain <N>]    conserva los N buckets más recientes
  sweep-staging [--secs <N>]      limpia archivos de staging abandonados
  maintenance                     pasada completa con la política configurada
  hosts [--state <ESTADO>]        lista hosts
  search <término>                hosts cuyo fqdn contiene el término
  reports <fqdn> [--limit <N>]    reportes recientes de un host
  report <id>                     bytes crudos de un reporte
  pin <fqdn> | unpin <fqdn>       exime / reincorpora un host a la purga
  summary                         conteo de hosts por estado";

fn main() {
    // Cargar .env si existe (DATABASE_URL, FLEET_*)
    let _ = dotenvy::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        eprintln!("{USAGE}");
        exit(2);
    };
    let rest = &args[1..];

    let mut ledger = match Ledger::open_from_env() {
        Ok(l) => l,
        Err(e) => {
            eprintln!("[fleet {command}] no se pudo abrir el ledger: {e}");
            exit(5);
        }
    };

    let code = match command {
        "ingest" => ingest(&ledger, rest),
        "enqueue" => enqueue(&mut ledger, rest),
        "prune" => {
            let days = positive_flag_or(command, rest, "--days", ledger.config().retention.report_retention_days);
            emit(command, ledger.prune_older_than(days))
        }
        "compact" => emit(command, ledger.compact_unchanged()),
        "orphans" => orphans(&ledger, rest),
        "history" => history(&ledger, rest),
        "sweep-staging" => {
            let secs = flag_or(command, rest, "--secs", ledger.config().retention.staging_max_age.as_secs());
            print_json(&ledger.sweep_staging(Duration::from_secs(secs)));
            0
        }
        "maintenance" => emit(command, ledger.run_maintenance()),
        "hosts" => hosts(&ledger, rest),
        "search" => match rest.first().filter(|t| !t.is_empty()) {
            Some(term) => emit(command, ledger.search_hosts(term)),
            None => {
                eprintln!("Uso: fleet search <término>");
                2
            }
        },
        "reports" => {
            let fqdn = fqdn_arg(command, rest);
            let limit = flag(command, rest, "--limit");
            emit(command, ledger.reports_for_host(&fqdn, limit))
        }
        "report" => report(&ledger, rest),
        "pin" | "unpin" => {
            let fqdn = fqdn_arg(command, rest);
            match ledger.set_pinned(&fqdn, command == "pin") {
                Ok(()) => {
                    print_json(&json!({ "fqdn": fqdn, "pinned": command == "pin" }));
                    0
                }
                Err(StoreError::NotFound) => {
                    eprintln!("[fleet {command}] host no encontrado: {fqdn}");
                    4
                }
                Err(e) => {
                    eprintln!("[fleet {command}] error: {e}");
                    5
                }
            }
        }
        "summary" => emit(command, ledger.state_summary()),
        _ => {
            eprintln!("{USAGE}");
            2
        }
    };
    ledger.shutdown();
    exit(code);
}

fn ingest(ledger: &Ledger, files: &[String]) -> i32 {
    if files.is_empty() {
        eprintln!("Uso: fleet ingest <archivo>...");
        return 2;
    }
    let mut code = 0;
    for file in files {
        let bytes = match std::fs::read(file) {
            Ok(b) => b,
            Err(e) => {
                eprintln!("[fleet ingest] no se pudo leer {file}: {e}");
                code = 5;
                continue;
            }
        };
        match ledger.ingest(&bytes) {
            Ok(IngestOutcome::Recorded { fqdn, report_id }) => {
                print_json(&json!({ "file": file, "fqdn": fqdn, "report_id": report_id, "duplicate": false }))
            }
            Ok(IngestOutcome::Duplicate { fqdn }) => {
                print_json(&json!({ "file": file, "fqdn": fqdn, "duplicate": true }))
            }
            Err(IngestError::Parse(e)) => {
                eprintln!("[fleet ingest] rechazado {file}: {e}");
                code = code.max(4);
            }
            Err(e) => {
                eprintln!("[fleet ingest] error en {file}: {e}");
                code = 5;
            }
        }
    }
    code
}

fn enqueue(ledger: &mut Ledger, files: &[String]) -> i32 {
    if files.is_empty() {
        eprintln!("Uso: fleet enqueue <archivo>...");
        return 2;
    }
    if let Err(e) = ledger.start_queue() {
        eprintln!("[fleet enqueue] no se pudo arrancar la cola: {e}");
        return 5;
    }
    let mut code = 0;
    for file in files {
        let result = std::fs::read(file).map_err(|e| e.to_string())
                                        .and_then(|bytes| ledger.enqueue(&bytes).map_err(|e| e.to_string()));
        match result {
            Ok(token) => print_json(&json!({ "file": file, "token": token.as_str() })),
            Err(e) => {
                eprintln!("[fleet enqueue] error en {file}: {e}");
                code = 5;
            }
        }
    }
    // el shutdown del ledger drena la cola antes de salir
    code
}

fn orphans(ledger: &Ledger, rest: &[String]) -> i32 {
    let retention = &ledger.config().retention;
    match rest.first().map(String::as_str) {
        Some("mark") => {
            let secs = positive_flag_or("orphans mark", rest, "--secs", retention.orphan_threshold_secs);
            emit("orphans mark", ledger.mark_orphaned(secs).map(|marked| json!({ "marked": marked })))
        }
        Some("purge") => {
            let days = positive_flag_or("orphans purge", rest, "--days", retention.orphan_purge_days);
            emit("orphans purge", ledger.purge_orphaned(days))
        }
        _ => {
            eprintln!("Uso: fleet orphans mark [--secs <N>] | fleet orphans purge [--days <N>]");
            2
        }
    }
}

fn history(ledger: &Ledger, rest: &[String]) -> i32 {
    match rest.first().map(String::as_str) {
        Some("prune") => {
            let retain = positive_flag_or("history prune", rest, "--retain", ledger.config().retention.history_retain_days);
            emit("history prune", ledger.prune_history(retain).map(|removed| json!({ "removed": removed })))
        }
        None => emit("history", ledger.history_buckets()),
        _ => {
            eprintln!("Uso: fleet history | fleet history prune [--retain <N>]");
            2
        }
    }
}

fn hosts(ledger: &Ledger, rest: &[String]) -> i32 {
    match flag::<String>("hosts", rest, "--state") {
        None => emit("hosts", ledger.list_hosts()),
        Some(raw) => match raw.parse::<HostState>() {
            Ok(state) => emit("hosts", ledger.hosts_in_state(state)),
            Err(e) => {
                eprintln!("[fleet hosts] {e}");
                2
            }
        },
    }
}

fn report(ledger: &Ledger, rest: &[String]) -> i32 {
    let Some(id) = rest.first().and_then(|s| s.parse::<i64>().ok()) else {
        eprintln!("Uso: fleet report <id>");
        return 2;
    };
    match ledger.report_by_identifier(id) {
        Ok(bytes) => {
            print!("{}", String::from_utf8_lossy(&bytes));
            0
        }
        Err(e @ (IngestError::NotFound(_) | IngestError::ArtifactPruned(_))) => {
            eprintln!("[fleet report] {e}");
            4
        }
        Err(e) => {
            eprintln!("[fleet report] error: {e}");
            5
        }
    }
}

fn fqdn_arg(command: &str, rest: &[String]) -> Fqdn {
    match rest.first().map(|raw| Fqdn::new(raw)) {
        Some(Ok(fqdn)) => fqdn,
        Some(Err(e)) => {
            eprintln!("[fleet {command}] {e}");
            exit(2);
        }
        None => {
            eprintln!("Uso: fleet {command} <fqdn>");
            exit(2);
        }
    }
}

/// Valor de `--name <v>`; sale con código 2 si está presente pero no parsea.
fn flag<T: std::str::FromStr>(command: &str, rest: &[String], name: &str) -> Option<T> {
    let pos = rest.iter().position(|a| a == name)?;
    match rest.get(pos + 1).map(|v| v.parse::<T>()) {
        Some(Ok(value)) => Some(value),
        _ => {
            eprintln!("[fleet {command}] valor inválido para {name}");
            exit(2);
        }
    }
}

fn flag_or<T: std::str::FromStr>(command: &str, rest: &[String], name: &str, default: T) -> T {
    flag(command, rest, name).unwrap_or(default)
}

/// Como `flag_or`, pero sale con código 2 si el valor es `<= 0`.
fn positive_flag_or<T>(command: &str, rest: &[String], name: &str, default: T) -> T
    where T: std::str::FromStr + PartialOrd + Default
{
    match require_positive(name, flag_or(command, rest, name, default)) {
        Ok(value) => value,
        Err(msg) => {
            eprintln!("[fleet {command}] {msg}");
            exit(2);
        }
    }
}

fn require_positive<T: PartialOrd + Default>(name: &str, value: T) -> Result<T, String> {
    if value <= T::default() {
        return Err(format!("{name} debe ser mayor que cero"));
    }
    Ok(value)
}

fn emit<T: Serialize, E: std::fmt::Display>(command: &str, result: Result<T, E>) -> i32 {
    match result {
        Ok(value) => {
            print_json(&value);
            0
        }
        Err(e) => {
            eprintln!("[fleet {command}] error: {e}");
            5
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("[fleet] no se pudo serializar la salida: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Vec<String> { v.iter().map(|s| s.to_string()).collect() }

    #[test]
    fn flags_fall_back_to_default() {
        assert_eq!(flag_or("prune", &args(&[]), "--days", 14i64), 14);
        assert_eq!(flag_or("prune", &args(&["--days", "3"]), "--days", 14i64), 3);
        assert_eq!(positive_flag_or("prune", &args(&["--days", "1"]), "--days", 14i64), 1);
        assert_eq!(positive_flag_or("history prune", &args(&[]), "--retain", 14usize), 14);
    }

    #[test]
    fn non_positive_windows_are_rejected() {
        assert_eq!(require_positive("--days", -1i64), Err("--days debe ser mayor que cero".to_string()));
        assert!(require_positive("--secs", 0i64).is_err());
        assert!(require_positive("--retain", 0usize).is_err());
        assert_eq!(require_positive("--days", i64::MAX), Ok(i64::MAX));
    }
}
