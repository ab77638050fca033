use std::collections::BTreeMap;
use std::io::{stdout, BufReader, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use chdo::dictionary::ChdoConfiguration;
use chdo::sfdu::{read_sfdus, SfduId};
use serde::Serialize;
use tracing::{info, warn};

use crate::info::Format;

#[derive(Debug, Serialize)]
struct Evaluation {
    index: usize,
    id: Option<SfduId>,
    properties: BTreeMap<String, bool>,
}

impl Evaluation {
    fn to_text(&self) -> String {
        let id = self.id.as_ref().map_or(String::from("-"), SfduId::to_string);
        let values: Vec<String> = self
            .properties
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect();
        format!("{:>8} {id} {}", self.index, values.join(" "))
    }
}

/// Property names to evaluate; every dictionary property when none are requested.
fn property_names(config: &ChdoConfiguration, requested: &[String]) -> Result<Vec<String>> {
    if requested.is_empty() {
        let mut names: Vec<String> = config.properties().map(|p| p.name.clone()).collect();
        names.sort();
        return Ok(names);
    }
    for name in requested {
        if config.property(name).is_none() {
            bail!("dictionary has no property {name}");
        }
    }
    Ok(requested.to_vec())
}

pub fn eval(
    config: &ChdoConfiguration,
    fpath: &Path,
    requested: &[String],
    format: &Format,
    matching: bool,
) -> Result<()> {
    let names = property_names(config, requested)?;
    let reader = std::fs::File::open(fpath).context("opening input")?;
    let mut out = stdout().lock();

    let (mut total, mut matched) = (0usize, 0usize);
    for (index, zult) in read_sfdus(BufReader::new(reader), config).enumerate() {
        let sfdu = match zult {
            Ok(sfdu) => sfdu,
            Err(err) => {
                warn!("skipping SFDU {index}: {err}");
                continue;
            }
        };
        total += 1;
        let properties = match chdo::evaluate_properties(config, &names, &sfdu) {
            Ok(properties) => properties,
            Err(err) => {
                warn!("failed to evaluate SFDU {index}: {err}");
                continue;
            }
        };
        if matching && !properties.values().all(|v| *v) {
            continue;
        }
        matched += 1;

        let evaluation = Evaluation {
            index,
            id: sfdu.label().map(|label| label.id.clone()),
            properties,
        };
        match format {
            Format::Json => {
                serde_json::to_writer(&mut out, &evaluation).context("serializing to json")?;
                writeln!(out).context("writing to stdout")?;
            }
            Format::Text => writeln!(out, "{}", evaluation.to_text()).context("writing to stdout")?,
        }
    }

    info!("evaluated {total} SFDUs; {matched} written");
    Ok(())
}
