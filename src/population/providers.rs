//! Population providers: Wikidata (coordinates + label), Wikidata label search,
//! and OpenStreetMap via Overpass.

use super::config::PopulationConfig;
use super::types::{ProviderError, Settlement};
use serde::Deserialize;
use std::collections::HashMap;

/// A data source that can answer "what is the population of this settlement?".
pub trait PopulationProvider {
    /// Tag recorded on settlements this provider resolves.
    fn source(&self) -> &str;

    /// `Ok(None)` means the provider answered but has no value.
    fn lookup(&self, settlement: &Settlement) -> Result<Option<u64>, ProviderError>;
}

/// The three providers in priority order.
pub fn default_providers(config: &PopulationConfig) -> Vec<Box<dyn PopulationProvider>> {
    let agent = config.agent();
    vec![
        Box::new(WikidataAroundProvider::new(config, agent.clone())),
        Box::new(WikidataLabelProvider::new(config, agent.clone())),
        Box::new(OverpassProvider::new(config, agent)),
    ]
}

// ─── Query escaping ─────────────────────────────────────────────

/// Escape text for a double-quoted SPARQL or Overpass QL string literal.
fn escape_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}

/// Parse a population value. Only plain non-negative integers are accepted.
fn parse_population_value(raw: &str) -> Option<u64> {
    let t = raw.trim();
    t.strip_prefix('+').unwrap_or(t).parse().ok()
}

// ─── Wikidata SPARQL ────────────────────────────────────────────

#[derive(Deserialize)]
struct SparqlResponse {
    results: SparqlResults,
}

#[derive(Deserialize)]
struct SparqlResults {
    #[serde(default)]
    bindings: Vec<SparqlBinding>,
}

#[derive(Deserialize)]
struct SparqlBinding {
    population: Option<SparqlTerm>,
}

#[derive(Deserialize)]
struct SparqlTerm {
    value: String,
}

/// Exact label within `radius_km` of the settlement's point, largest population first.
pub fn around_query(settlement: &Settlement, config: &PopulationConfig) -> String {
    format!(
        r#"SELECT ?population WHERE {{
  ?city wdt:P17 wd:{country};
        rdfs:label "{name}"@{lang};
        wdt:P625 ?coordinates;
        wdt:P1082 ?population.
  SERVICE wikibase:around {{
    ?city wdt:P625 ?location .
    bd:serviceParam wikibase:center "Point({lon} {lat})"^^geo:wktLiteral .
    bd:serviceParam wikibase:radius "{radius}" .
  }}
}}
ORDER BY DESC(?population)
LIMIT 1"#,
        country = config.country_qid,
        name = escape_literal(&settlement.name),
        lang = config.label_language,
        lon = settlement.lon,
        lat = settlement.lat,
        radius = config.radius_km,
    )
}

/// City-class items whose label contains the name (case-insensitive), largest first.
pub fn label_query(settlement: &Settlement, config: &PopulationConfig) -> String {
    format!(
        r#"SELECT ?city ?cityLabel ?population WHERE {{
  ?city wdt:P17 wd:{country};
        wdt:P31 wd:{class};
        wdt:P1082 ?population.
  SERVICE wikibase:label {{ bd:serviceParam wikibase:language "{lang}". }}
  FILTER(CONTAINS(LCASE(?cityLabel), LCASE("{name}"))).
}}
ORDER BY DESC(?population)
LIMIT 1"#,
        country = config.country_qid,
        class = config.settlement_class_qid,
        lang = config.label_language,
        name = escape_literal(&settlement.name),
    )
}

/// Read `results.bindings[0].population.value` from a SPARQL JSON response.
pub fn parse_sparql_population(body: &str) -> Result<Option<u64>, ProviderError> {
    let response: SparqlResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

    let Some(first) = response.results.bindings.first() else {
        return Ok(None);
    };
    let term = first
        .population
        .as_ref()
        .ok_or_else(|| ProviderError::InvalidResponse("binding has no population".into()))?;

    Ok(parse_population_value(&term.value))
}

fn sparql_population(
    agent: &ureq::Agent,
    endpoint: &str,
    query: &str,
) -> Result<Option<u64>, ProviderError> {
    let response = agent
        .get(endpoint)
        .query("query", query)
        .query("format", "json")
        .set("Accept", "application/json")
        .call()?;

    let body = response
        .into_string()
        .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

    parse_sparql_population(&body)
}

/// Provider 1: exact label + proximity.
pub struct WikidataAroundProvider {
    agent: ureq::Agent,
    config: PopulationConfig,
}

impl WikidataAroundProvider {
    pub fn new(config: &PopulationConfig, agent: ureq::Agent) -> Self {
        Self { agent, config: config.clone() }
    }
}

impl PopulationProvider for WikidataAroundProvider {
    fn source(&self) -> &str {
        "Wikidata"
    }

    fn lookup(&self, settlement: &Settlement) -> Result<Option<u64>, ProviderError> {
        let query = around_query(settlement, &self.config);
        sparql_population(&self.agent, &self.config.sparql_endpoint, &query)
    }
}

/// Provider 2: fuzzy label search, coordinates ignored.
pub struct WikidataLabelProvider {
    agent: ureq::Agent,
    config: PopulationConfig,
}

impl WikidataLabelProvider {
    pub fn new(config: &PopulationConfig, agent: ureq::Agent) -> Self {
        Self { agent, config: config.clone() }
    }
}

impl PopulationProvider for WikidataLabelProvider {
    fn source(&self) -> &str {
        "Wikidata Search"
    }

    fn lookup(&self, settlement: &Settlement) -> Result<Option<u64>, ProviderError> {
        let query = label_query(settlement, &self.config);
        sparql_population(&self.agent, &self.config.sparql_endpoint, &query)
    }
}

// ─── OpenStreetMap Overpass ─────────────────────────────────────

#[derive(Deserialize)]
struct OverpassResponse {
    elements: Vec<OverpassElement>,
}

#[derive(Deserialize)]
struct OverpassElement {
    #[serde(default)]
    tags: HashMap<String, serde_json::Value>,
}

/// Place nodes, ways and relations tagged with the exact name inside the area.
pub fn overpass_query(settlement: &Settlement, config: &PopulationConfig) -> String {
    let name = escape_literal(&settlement.name);
    format!(
        r#"[out:json];
area[name="{area}"][admin_level="{level}"]->.a;
(
  node(area.a)[place][name="{name}"];
  way(area.a)[place][name="{name}"];
  relation(area.a)[place][name="{name}"];
);
out body;"#,
        area = escape_literal(&config.area_name),
        level = config.admin_level,
        name = name,
    )
}

/// First element with an integer `population` tag wins; malformed tags are skipped.
pub fn parse_overpass_population(body: &str) -> Result<Option<u64>, ProviderError> {
    let response: OverpassResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

    let found = response.elements.iter().find_map(|el| match el.tags.get("population")? {
        serde_json::Value::String(s) => parse_population_value(s),
        serde_json::Value::Number(n) => n.as_u64(),
        _ => None,
    });
    Ok(found)
}

/// Provider 3: exact OSM `name` tag inside the administrative area.
pub struct OverpassProvider {
    agent: ureq::Agent,
    config: PopulationConfig,
}

impl OverpassProvider {
    pub fn new(config: &PopulationConfig, agent: ureq::Agent) -> Self {
        Self { agent, config: config.clone() }
    }
}

impl PopulationProvider for OverpassProvider {
    fn source(&self) -> &str {
        "OSM"
    }

    fn lookup(&self, settlement: &Settlement) -> Result<Option<u64>, ProviderError> {
        let query = overpass_query(settlement, &self.config);
        let response = self
            .agent
            .post(&self.config.overpass_endpoint)
            .send_form(&[("data", query.as_str())])?;

        let body = response
            .into_string()
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        parse_overpass_population(&body)
    }
}
