use fleet_domain::{ContentHash, HostState, PuppetYamlParser, ReportParser, ReportState};

// Reporte recortado tal como lo emite un agente Puppet (con tags Ruby).
const PUPPET_REPORT: &str = r#"--- !ruby/object:Puppet::Transaction::Report
host: web01.example.com
time: '2024-03-01T10:00:00.000000000+00:00'
configuration_version: 1709287200
transaction_uuid: 5d0bd8c2-3d1c-4b8b-9d3f-2f0c3f0e3c11
report_format: 10
puppet_version: 7.28.0
status: changed
environment: production
role: frontend
build_time: 1709280000
metrics:
  resources: !ruby/object:Puppet::Util::Metric
    name: resources
    label: Resources
    values:
    - - total
      - Total
      - 112
    - - skipped
      - Skipped
      - 3
    - - failed
      - Failed
      - 0
    - - changed
      - Changed
      - 4
  time: !ruby/object:Puppet::Util::Metric
    name: time
    label: Time
    values:
    - - file
      - File
      - 1.25
    - - total
      - Total
      - 14.5
logs: []
"#;

#[test]
fn test_puppet_report_summary_fields() {
    let report = PuppetYamlParser.parse(PUPPET_REPORT.as_bytes()).unwrap();
    assert_eq!(report.fqdn.as_str(), "web01.example.com");
    assert_eq!(report.state, ReportState::Changed);
    assert_eq!(report.total, 112);
    assert_eq!(report.skipped, 3);
    assert_eq!(report.failed, 0);
    assert_eq!(report.changed, 4);
    assert!((report.runtime - 14.5).abs() < f64::EPSILON);
    assert_eq!(report.role, "frontend");
    assert_eq!(report.branch, "production");
    assert_eq!(report.build_time, 1_709_280_000);
}

#[test]
fn test_hash_depends_only_on_bytes() {
    let a = PuppetYamlParser.parse(PUPPET_REPORT.as_bytes()).unwrap();
    let b = PuppetYamlParser.parse(PUPPET_REPORT.as_bytes()).unwrap();
    assert_eq!(a.hash, b.hash);

    let altered = PUPPET_REPORT.replace("14.5", "14.6");
    let c = PuppetYamlParser.parse(altered.as_bytes()).unwrap();
    assert_ne!(a.hash, c.hash);
    assert_eq!(c.hash, Some(ContentHash::of(altered.as_bytes())));
}

#[test]
fn test_fqdn_with_path_separator_is_a_parse_error() {
    let doc = "host: ../../etc\nstatus: failed\n";
    assert!(PuppetYamlParser.parse(doc.as_bytes()).is_err());
}

#[test]
fn test_host_state_from_report_state() {
    assert_eq!(HostState::from(ReportState::Failed), HostState::Failed);
    assert_eq!(HostState::Orphaned.as_str(), "orphaned");
}

#[test]
fn test_report_serializes_with_lowercase_state() {
    let report = PuppetYamlParser.parse(PUPPET_REPORT.as_bytes()).unwrap();
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["state"], "changed");
    assert_eq!(json["fqdn"], "web01.example.com");
}
