use std::{
    collections::BTreeMap,
    fs::{self, read_to_string},
    io,
    path::Path,
};

use _model::{BrandJob, OsmId};
use anyhow::{Context, Result};
use itertools::Itertools;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ureq::{Agent, AgentBuilder};

use crate::config::Config;

/// Builds the query for every motorcycle shop whose brand or name matches the
/// job's brand, case-insensitively. The generic job asks for shops without
/// any brand tag instead.
pub fn query(job: &BrandJob, config: &Config) -> String {
    let filters = if job.is_generic() {
        vec![r#"nwr["shop"="motorcycle"]["brand"!~".*"];"#.to_string()]
    } else {
        let pattern = match config.query_overrides.get(&job.key()) {
            Some(x) => x.clone(),
            None => escape(job.brand.trim()),
        };
        ["brand", "name"]
            .iter()
            .map(|key| format!(r#"nwr["shop"="motorcycle"]["{key}"~".*{pattern}.*",i];"#))
            .collect()
    };

    format!(
        "[out:json][timeout:{}];\n(\n{}\n);\nout center;\n",
        config.query_timeout,
        filters.iter().join("\n")
    )
}

// only what would end the quoted string early
fn escape(brand: &str) -> String {
    brand.replace('\\', r"\\").replace('"', r#"\""#)
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("overpass answered with status {code}: {body}")]
    Status { code: u16, body: String },
    #[error("request failed: {0}")]
    Transport(#[from] ureq::Transport),
    #[error("unreadable response: {0}")]
    Parse(#[from] io::Error),
}

pub trait Source {
    fn fetch(&self, query: &str) -> Result<Vec<RawElement>, FetchError>;
}

pub struct Overpass {
    agent: Agent,
    url: String,
}

impl Overpass {
    pub fn new(config: &Config) -> Self {
        let agent = AgentBuilder::new()
            .user_agent(&config.user_agent)
            .timeout(config.fetch_timeout())
            .build();
        Self {
            agent,
            url: config.overpass_url.clone(),
        }
    }
}

impl Source for Overpass {
    fn fetch(&self, query: &str) -> Result<Vec<RawElement>, FetchError> {
        let response = match self.agent.post(&self.url).send_form(&[("data", query)]) {
            Ok(x) if x.status() == 200 => x,
            Ok(x) | Err(ureq::Error::Status(_, x)) => {
                return Err(FetchError::Status {
                    code: x.status(),
                    body: x
                        .into_string()
                        .unwrap_or_default()
                        .chars()
                        .take(200)
                        .collect(),
                })
            }
            Err(ureq::Error::Transport(x)) => return Err(x.into()),
        };

        let response: OverpassResponse = response.into_json()?;
        Ok(response.elements)
    }
}

/// Fetches the elements for one brand. With a cache directory the raw
/// response is kept as `<brand>-osm.json` and reused by later runs.
pub fn load(
    source: &dyn Source,
    job: &BrandJob,
    query: &str,
    cache: Option<&Path>,
) -> Result<Vec<RawElement>> {
    let Some(dir) = cache else {
        return Ok(source.fetch(query)?);
    };

    let path = dir.join(format!("{}-osm.json", job.brand));
    if path.exists() {
        debug!("{job}: reading cached elements from {}", path.display());
        return serde_json::from_str(&read_to_string(&path)?)
            .with_context(|| format!("Corrupt cache file {}", path.display()));
    }

    let elements = source.fetch(query)?;
    info!("{job}: caching {} elements", elements.len());
    fs::create_dir_all(dir)?;
    let mut contents = serde_json::to_string_pretty(&elements)?;
    contents.push('\n');
    fs::write(&path, contents)?;
    Ok(elements)
}

pub fn parse(raw: &str) -> Result<Vec<RawElement>, serde_json::Error> {
    let response: OverpassResponse = serde_json::from_str(raw)?;
    Ok(response.elements)
}

#[derive(Deserialize)]
struct OverpassResponse {
    elements: Vec<RawElement>,
}

/// An element as overpass returns it for `out center`: nodes carry their own
/// position, ways and relations a `center`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct RawElement {
    #[serde(rename = "type")]
    pub kind: ElementKind,
    #[serde(default)]
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub center: Option<RawPosition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeMap<String, String>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ElementKind {
    Node,
    Way,
    Relation,
    #[serde(other)]
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct RawPosition {
    pub lat: f64,
    pub lon: f64,
}

impl RawElement {
    pub fn osm_id(&self) -> Option<OsmId> {
        match self.kind {
            ElementKind::Node => Some(OsmId::Node(self.id)),
            ElementKind::Way => Some(OsmId::Way(self.id)),
            ElementKind::Relation => Some(OsmId::Relation(self.id)),
            ElementKind::Other => None,
        }
    }

    /// Direct coordinates for nodes, the center for everything else.
    pub fn position(&self) -> Option<RawPosition> {
        match (self.kind, self.lat, self.lon) {
            (ElementKind::Node, Some(lat), Some(lon)) => Some(RawPosition { lat, lon }),
            _ => self.center,
        }
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.as_ref()?.get(key).map(|x| x.as_str())
    }

    pub fn describe(&self) -> String {
        match self.osm_id() {
            Some(x) => x.link(),
            None => format!("element {}", self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        cell::Cell,
        io::{BufRead, BufReader, Read, Write},
        net::TcpListener,
        thread,
    };

    use super::*;

    /// Answers a single request with a canned status line and body.
    fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            let mut length = 0;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                if let Some((key, value)) = line.split_once(':') {
                    if key.eq_ignore_ascii_case("content-length") {
                        length = value.trim().parse().unwrap();
                    }
                }
            }
            let mut request = vec![0; length];
            reader.read_exact(&mut request).unwrap();

            let mut stream = reader.into_inner();
            write!(
                stream,
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            )
            .unwrap();
        });
        format!("http://{addr}/api/interpreter")
    }

    fn overpass(url: String) -> Overpass {
        Overpass::new(&Config {
            overpass_url: url,
            ..Default::default()
        })
    }

    fn job(brand: &str) -> BrandJob {
        BrandJob::new(brand, "ATV", "placemark-orange")
    }

    #[test]
    fn brand_query() {
        let q = query(&job("BMW"), &Config::default());
        assert_eq!(
            q,
            r#"[out:json][timeout:2400];
(
nwr["shop"="motorcycle"]["brand"~".*BMW.*",i];
nwr["shop"="motorcycle"]["name"~".*BMW.*",i];
);
out center;
"#
        );
    }

    #[test]
    fn generic_query() {
        let q = query(&job("GENERIC"), &Config::default());
        assert!(q.contains(r#"nwr["shop"="motorcycle"]["brand"!~".*"];"#));
        assert!(!q.contains(r#"["name""#));
    }

    #[test]
    fn spaced_brands_share_a_pattern() {
        let config = Config::default();
        for brand in ["GasGas", "Gas Gas", "gas-gas"] {
            let q = query(&job(brand), &config);
            assert!(q.contains(r#"["brand"~".*gas ?gas.*",i]"#), "{q}");
            assert!(q.contains(r#"["name"~".*gas ?gas.*",i]"#), "{q}");
        }
        assert_eq!(
            query(&job("CFMOTO"), &config),
            query(&job("CF MOTO"), &config)
        );
    }

    #[test]
    fn quotes_are_escaped() {
        let q = query(&job(r#"Moto "X""#), &Config::default());
        assert!(q.contains(r#"".*Moto \"X\".*""#), "{q}");
    }

    #[test]
    fn parse_elements() {
        let elements = parse(
            r#"{"version":0.6,"elements":[
                {"type":"node","id":1,"lat":48.1,"lon":11.5,"tags":{"name":"A"}},
                {"type":"way","id":2,"center":{"lat":47.0,"lon":10.0}},
                {"type":"relation","id":3,"tags":{}},
                {"type":"area","id":4}
            ]}"#,
        )
        .unwrap();

        assert_eq!(elements.len(), 4);
        assert_eq!(
            elements[0].position(),
            Some(RawPosition { lat: 48.1, lon: 11.5 })
        );
        assert_eq!(elements[0].tag("name"), Some("A"));
        assert_eq!(
            elements[1].position(),
            Some(RawPosition { lat: 47.0, lon: 10.0 })
        );
        assert_eq!(elements[1].tags, None);
        assert_eq!(elements[2].position(), None);
        assert_eq!(elements[2].osm_id(), Some(OsmId::Relation(3)));
        assert_eq!(elements[3].kind, ElementKind::Other);
        assert_eq!(elements[3].osm_id(), None);
    }

    #[test]
    fn missing_elements_key() {
        assert!(parse(r#"{"remark":"runtime error"}"#).is_err());
    }

    struct Counting {
        calls: Cell<usize>,
    }

    impl Source for Counting {
        fn fetch(&self, _query: &str) -> Result<Vec<RawElement>, FetchError> {
            self.calls.set(self.calls.get() + 1);
            Ok(parse(r#"{"elements":[{"type":"node","id":1,"lat":1.0,"lon":2.0}]}"#).unwrap())
        }
    }

    #[test]
    fn cache_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let source = Counting {
            calls: Cell::new(0),
        };
        let job = job("BMW");

        let first = load(&source, &job, "q", Some(dir.path())).unwrap();
        let second = load(&source, &job, "q", Some(dir.path())).unwrap();
        assert_eq!(first, second);
        assert_eq!(source.calls.get(), 1);
        assert!(dir.path().join("BMW-osm.json").exists());

        load(&source, &job, "q", None).unwrap();
        assert_eq!(source.calls.get(), 2);
    }

    #[test]
    fn error_status() {
        let url = serve_once("504 Gateway Timeout", "rate limited");
        let result = overpass(url).fetch("[out:json];");

        assert!(matches!(
            result,
            Err(FetchError::Status { code: 504, ref body }) if body == "rate limited"
        ));
    }

    #[test]
    fn unreadable_body() {
        let url = serve_once("200 OK", "not json");
        let result = overpass(url).fetch("[out:json];");

        assert!(matches!(result, Err(FetchError::Parse(_))));
    }

    #[test]
    fn elements_over_http() {
        let url = serve_once(
            "200 OK",
            r#"{"elements":[{"type":"node","id":7,"lat":1.5,"lon":2.5,"tags":{"name":"Shop"}}]}"#,
        );
        let elements = overpass(url).fetch("[out:json];").unwrap();

        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].tag("name"), Some("Shop"));
    }
}
