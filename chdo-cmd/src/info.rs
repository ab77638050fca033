use std::cmp;
use std::collections::BTreeMap;
use std::io::{stdout, BufReader, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chdo::dictionary::{ChdoConfiguration, ChdoType};
use chdo::sfdu::{read_sfdus, ChdoSfdu};
use chrono::{DateTime, Utc};
use handlebars::handlebars_helper;
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub enum Format {
    Json,
    Text,
}

impl clap::ValueEnum for Format {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Json, Self::Text]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        match self {
            Self::Json => Some(clap::builder::PossibleValue::new("json")),
            Self::Text => Some(clap::builder::PossibleValue::new("text")),
        }
    }
}

#[derive(Default, Debug, Clone, Serialize)]
struct Summary {
    total_sfdus: usize,
    total_bytes: usize,
    errors: usize,
    first_time: Option<DateTime<Utc>>,
    last_time: Option<DateTime<Utc>>,
    duration_secs: f64,
}

#[derive(Default, Debug, Clone, Serialize)]
struct ChdoSummary {
    name: String,
    count: usize,
    bytes: usize,
}

#[derive(Debug, Clone, Serialize)]
struct Info {
    filename: String,
    dictionary_version: String,
    summary: Summary,
    chdos: BTreeMap<ChdoType, ChdoSummary>,
    data_descriptions: BTreeMap<String, usize>,
    spacecraft: BTreeMap<u32, usize>,
}

fn update_times(summary: &mut Summary, sfdu: &ChdoSfdu, time_field: &str) {
    let Some(chdo) = sfdu.find_field(time_field) else {
        return;
    };
    match chdo.date(time_field) {
        Ok(time) => {
            summary.first_time = summary
                .first_time
                .map_or(Some(time), |cur| Some(cmp::min(time, cur)));
            summary.last_time = summary
                .last_time
                .map_or(Some(time), |cur| Some(cmp::max(time, cur)));
            if let (Some(first), Some(last)) = (summary.first_time, summary.last_time) {
                summary.duration_secs = (last - first).num_milliseconds() as f64 / 1000.0;
            }
        }
        Err(err) => debug!("failed to decode {time_field}: {err}"),
    }
}

fn summarize(config: &ChdoConfiguration, fpath: &Path, time_field: &str) -> Result<Info> {
    let reader = std::fs::File::open(fpath).context("opening input")?;

    let mut summary = Summary::default();
    let mut chdos: BTreeMap<ChdoType, ChdoSummary> = BTreeMap::default();
    let mut data_descriptions: BTreeMap<String, usize> = BTreeMap::default();
    let mut spacecraft: BTreeMap<u32, usize> = BTreeMap::default();

    for (idx, zult) in read_sfdus(BufReader::new(reader), config).enumerate() {
        let sfdu = match zult {
            Ok(sfdu) => sfdu,
            Err(err) => {
                warn!("skipping SFDU {idx}: {err}");
                summary.errors += 1;
                continue;
            }
        };
        summary.total_sfdus += 1;

        if let Some(label) = sfdu.label() {
            summary.total_bytes += chdo::SfduLabel::LEN + label.length as usize;
            *data_descriptions.entry(label.id.to_string()).or_default() += 1;
        }
        for chdo in sfdu.chdos() {
            let entry = chdos.entry(chdo.chdo_type()).or_insert_with(|| ChdoSummary {
                name: chdo.definition().name.clone(),
                ..Default::default()
            });
            entry.count += 1;
            entry.bytes += chdo.raw_value().len();
        }
        match sfdu.spacecraft_id() {
            Ok(Some(id)) => *spacecraft.entry(id).or_default() += 1,
            Ok(None) => {}
            Err(err) => debug!("failed to decode spacecraft id from SFDU {idx}: {err}"),
        }
        update_times(&mut summary, &sfdu, time_field);
    }

    Ok(Info {
        filename: fpath.to_string_lossy().to_string(),
        dictionary_version: config.version().to_string(),
        summary,
        chdos,
        data_descriptions,
        spacecraft,
    })
}

pub fn info(config: &ChdoConfiguration, fpath: &Path, format: &Format, time_field: &str) -> Result<()> {
    let info = summarize(config, fpath, time_field)?;

    match format {
        Format::Json => {
            serde_json::to_writer_pretty(stdout(), &info).context("serializing to json")
        }
        Format::Text => {
            let data = render_text(&info).context("serializing info")?;
            stdout()
                .write_all(str::as_bytes(&data))
                .context("writing to stdout")
        }
    }
}

fn render_text(info: &Info) -> Result<String> {
    handlebars_helper!(left_pad: |num: u64, v: Json| {
        let v = match v {
            serde_json::Value::String(s) => s.to_owned(),
            serde_json::Value::Null => String::new(),
            _ => v.to_string()
        };
        let num = usize::try_from(num).unwrap_or(v.len()).max(v.len());
        format!("{v:>num$}")
    });
    let mut hb = handlebars::Handlebars::new();
    hb.register_helper("lpad", Box::new(left_pad));
    hb.register_template_string("info", TEXT_TEMPLATE)
        .context("registering template")?;

    hb.render("info", &info).context("rendering text")
}

const TEXT_TEMPLATE: &str = r"{{ filename }} (dictionary {{ dictionary_version }})
===============================================================================================
First:      {{ summary.first_time }}
Last:       {{ summary.last_time }}
Duration:   {{ summary.duration_secs }}s
SFDUs:      {{ summary.total_sfdus }}
Bytes:      {{ summary.total_bytes }}
Errors:     {{ summary.errors }}
Spacecraft: {{ #each spacecraft }}{{ @key }}({{ this }}){{ #if @last }}{{ else }}, {{ /if }}{{ /each }}
-----------------------------------------------------------------------------------------------
Data description                                                                          Count
-----------------------------------------------------------------------------------------------
{{ #each data_descriptions }}{{ @key }}{{ lpad 80 this }}
{{/each }}-----------------------------------------------------------------------------------------------
Type    Name                                                                 Count        Bytes
-----------------------------------------------------------------------------------------------
{{ #each chdos }}{{ lpad 4 @key }}    {{ name }}{{ lpad 70 count }}{{ lpad 13 bytes }}
{{/each }}
";
