//! Integration tests for XBRL archive parsing

use kessan_data::DataError;
use kessan_data::edinet::{
    ExtractionStatus, FactField, TagTable, extract_from_archive, extract_instance,
};
use std::io::{Cursor, Write};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

fn build_archive(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in entries {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn instance(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<xbrli:xbrl xmlns:xbrli="http://www.xbrl.org/2003/instance"
            xmlns:xbrldi="http://xbrl.org/2006/xbrldi"
            xmlns:jppfs_cor="http://disclosure.edinet-fsa.go.jp/taxonomy/jppfs/2023-12-01/jppfs_cor"
            xmlns:jpcrp_cor="http://disclosure.edinet-fsa.go.jp/taxonomy/jpcrp/2023-12-01/jpcrp_cor">
  <xbrli:context id="Prior1YearDuration">
    <xbrli:period><xbrli:startDate>2022-04-01</xbrli:startDate><xbrli:endDate>2023-03-31</xbrli:endDate></xbrli:period>
  </xbrli:context>
  <xbrli:context id="CurrentYearDuration">
    <xbrli:period><xbrli:startDate>2023-04-01</xbrli:startDate><xbrli:endDate>2024-03-31</xbrli:endDate></xbrli:period>
  </xbrli:context>
  <xbrli:context id="CurrentYearInstant">
    <xbrli:period><xbrli:instant>2024-03-31</xbrli:instant></xbrli:period>
  </xbrli:context>
  <xbrli:context id="CurrentYearInstant_NonConsolidatedMember">
    <xbrli:period><xbrli:instant>2024-03-31</xbrli:instant></xbrli:period>
    <xbrli:scenario>
      <xbrldi:explicitMember dimension="jppfs_cor:ConsolidatedOrNonConsolidatedAxis">jppfs_cor:NonConsolidatedMember</xbrldi:explicitMember>
    </xbrli:scenario>
  </xbrli:context>
{}
</xbrli:xbrl>"#,
        body
    )
}

#[test]
fn test_extracts_facts_from_public_doc_instance() {
    let xbrl = instance(
        r#"
  <jppfs_cor:NetSales contextRef="Prior1YearDuration" unitRef="JPY" decimals="-6">900</jppfs_cor:NetSales>
  <jppfs_cor:NetSales contextRef="CurrentYearDuration" unitRef="JPY" decimals="-6">1,000</jppfs_cor:NetSales>
  <jppfs_cor:OperatingIncome contextRef="CurrentYearDuration" unitRef="JPY" decimals="-6">100</jppfs_cor:OperatingIncome>
  <jppfs_cor:Assets contextRef="CurrentYearInstant_NonConsolidatedMember" unitRef="JPY" decimals="-6">4000</jppfs_cor:Assets>
  <jppfs_cor:Assets contextRef="CurrentYearInstant" unitRef="JPY" decimals="-6">5000</jppfs_cor:Assets>
  <jppfs_cor:NetCashProvidedByUsedInInvestingActivities contextRef="CurrentYearDuration" unitRef="JPY" decimals="-6">-300</jppfs_cor:NetCashProvidedByUsedInInvestingActivities>
  <jpcrp_cor:NumberOfEmployees contextRef="CurrentYearInstant" unitRef="pure" decimals="0">1234</jpcrp_cor:NumberOfEmployees>
"#,
    );
    let archive = build_archive(&[
        ("XBRL/PublicDoc/jpcrp030000-asr-001_E00001-000_2024-03-31_01_2024-06-20.xbrl", xbrl.as_str()),
        ("XBRL/PublicDoc/jpcrp030000-asr-001_E00001-000_2024-03-31_01_2024-06-20.xsd", "<schema/>"),
    ]);
    let table = TagTable::builtin().unwrap();

    let outcome = extract_from_archive(&archive, "S100TEST", &table, false);
    assert_eq!(outcome.status(), ExtractionStatus::Partial);

    let facts = outcome.facts();
    assert_eq!(facts.sales_amount, Some(1000.0));
    assert_eq!(facts.operating_income, Some(100.0));
    assert_eq!(facts.total_assets, Some(5000.0));
    assert_eq!(facts.investing_cf, Some(-300.0));
    assert_eq!(facts.employee_count, Some(1234));
    assert_eq!(facts.get(FactField::OrdinaryIncome), None);
    assert_eq!(facts.period_end.as_deref(), Some("2024-03-31"));
}

#[test]
fn test_full_capture_serialises_every_fact() {
    let xbrl = instance(
        r#"
  <jppfs_cor:NetSales contextRef="CurrentYearDuration" unitRef="JPY" decimals="-6">1000</jppfs_cor:NetSales>
  <jppfs_cor:GrossProfit contextRef="CurrentYearDuration" unitRef="JPY" decimals="-6">400</jppfs_cor:GrossProfit>
"#,
    );
    let archive = build_archive(&[("XBRL/PublicDoc/instance.xbrl", xbrl.as_str())]);
    let table = TagTable::builtin().unwrap();

    let outcome = extract_from_archive(&archive, "S100TEST", &table, true);
    let kessan_data::edinet::Extraction::Extracted { all_facts_json, .. } = outcome else {
        panic!("expected extracted outcome");
    };
    let json: serde_json::Value = serde_json::from_str(&all_facts_json.unwrap()).unwrap();
    let names: Vec<&str> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["NetSales", "GrossProfit"]);
}

#[test]
fn test_public_doc_preferred_over_inline_pages() {
    let primary = instance(
        r#"<jppfs_cor:NetSales contextRef="CurrentYearDuration" unitRef="JPY">1000</jppfs_cor:NetSales>"#,
    );
    // larger page with a different value; must lose to the .xbrl instance
    let inline = format!(
        r#"<html xmlns="http://www.w3.org/1999/xhtml" xmlns:ix="http://www.xbrl.org/2013/inlineXBRL">
<body>{}<ix:nonFraction name="jppfs_cor:NetSales" contextRef="CurrentYearDuration" unitRef="JPY">5</ix:nonFraction></body></html>"#,
        "<p>padding</p>".repeat(200)
    );
    let archive = build_archive(&[
        ("XBRL/PublicDoc/0101010_honbun_ixbrl.htm", inline.as_str()),
        ("XBRL/PublicDoc/instance.xbrl", primary.as_str()),
        ("XBRL/AuditDoc/audit.xbrl", primary.as_str()),
    ]);

    let instance = extract_instance(&archive, "S100TEST").unwrap();
    assert_eq!(instance.source.as_deref(), Some("XBRL/PublicDoc/instance.xbrl"));
    assert_eq!(instance.facts[0].value, 1000.0);
}

#[test]
fn test_falls_back_to_inline_xbrl() {
    let inline = r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:ix="http://www.xbrl.org/2013/inlineXBRL"
      xmlns:xbrli="http://www.xbrl.org/2003/instance">
<body>
  <ix:header><ix:resources>
    <xbrli:context id="CurrentYearDuration">
      <xbrli:period><xbrli:endDate>2024-03-31</xbrli:endDate></xbrli:period>
    </xbrli:context>
  </ix:resources></ix:header>
  <ix:nonFraction name="jppfs_cor:NetSales" contextRef="CurrentYearDuration" unitRef="JPY" scale="3">2,500</ix:nonFraction>
</body></html>"#;
    let archive = build_archive(&[
        ("XBRL/PublicDoc/manifest_PublicDoc.xml", "<manifest><list/></manifest>"),
        ("XBRL/PublicDoc/0101010_honbun_ixbrl.htm", inline),
    ]);

    let instance = extract_instance(&archive, "S100TEST").unwrap();
    assert_eq!(instance.root, "html");
    assert_eq!(instance.facts[0].value, 2_500_000.0);
}

#[test]
fn test_archive_without_instance() {
    let archive = build_archive(&[("XBRL/PublicDoc/readme.xml", "<manifest/>")]);
    let result = extract_instance(&archive, "S100NONE");
    assert!(matches!(result, Err(DataError::InstanceNotFound(id)) if id == "S100NONE"));

    let table = TagTable::builtin().unwrap();
    let outcome = extract_from_archive(&archive, "S100NONE", &table, false);
    assert_eq!(outcome.status(), ExtractionStatus::ParseFailed);
}

#[test]
fn test_not_a_zip() {
    let result = extract_instance(br#"{"metadata":{"status":"404"}}"#, "S100JSON");
    assert!(matches!(result, Err(DataError::Archive(_))));
}
