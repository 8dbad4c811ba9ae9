use std::net::IpAddr;

use speakerwatch_common::config::MonitorConfig;
use speakerwatch_common::model::HealthVerdict;
use speakerwatch_core::{HttpProber, Prober};

use crate::terminal::{format, print, spinner};

pub async fn probe(address: IpAddr, cfg: &MonitorConfig, json: bool) -> anyhow::Result<()> {
    let prober: HttpProber = HttpProber::new()?;

    let verdict: HealthVerdict = {
        let _spinner = (!json).then(|| spinner::start(&format!("Probing {address}...")));
        prober.check(address, cfg.threshold()).await
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&verdict)?);
        return Ok(());
    }

    print::header("probe result");
    print::tree_head(0, &address.to_string(), format::status(verdict.healthy));
    print::as_tree_one_level(format::verdict_details(&verdict));
    Ok(())
}
