use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use msgports::port::PortId;
use msgports::sender::ResolvedMessage;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// One line of command output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    /// A message reached the remote side. `seq` counts deliveries from 1.
    Delivered {
        seq: usize,
        destination: String,
        payload: String,
        target_origin: String,
        ports: Vec<PortId>,
    },
    /// A post failed validation and was neither sent nor queued.
    Rejected {
        step: usize,
        payload: String,
        reason: String,
    },
    /// A sender still held messages when the script ended.
    Stalled {
        sender: String,
        queued: usize,
        sender_ready: bool,
        sender_closed: bool,
        port_closed: bool,
    },
}

impl Event {
    pub fn delivered(seq: usize, message: &ResolvedMessage) -> Self {
        Self::Delivered {
            seq,
            destination: message.destination.clone(),
            payload: message.payload.clone(),
            target_origin: message.target_origin.clone(),
            ports: message.ports.clone(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Delivered { .. } => "delivered",
            Self::Rejected { .. } => "rejected",
            Self::Stalled { .. } => "stalled",
        }
    }
}

pub fn print_events(events: &[Event], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for event in events {
                println!(
                    "{}",
                    serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string())
                );
            }
        }
        OutputFormat::Table => {
            if events.is_empty() {
                return;
            }
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["EVENT", "#", "TARGET", "PAYLOAD", "DETAIL"]);
            for event in events {
                table.add_row(table_row(event));
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for event in events {
                println!("{}", pretty_line(event));
            }
        }
        OutputFormat::Raw => {
            let mut out = std::io::stdout();
            for event in events {
                if let Event::Delivered { payload, .. } = event {
                    let _ = writeln!(out, "{payload}");
                }
            }
            let _ = out.flush();
        }
    }
}

fn table_row(event: &Event) -> Vec<String> {
    match event {
        Event::Delivered {
            seq,
            destination,
            payload,
            ports,
            ..
        } => vec![
            event.kind().to_string(),
            seq.to_string(),
            destination.clone(),
            payload.clone(),
            format!("ports={}", port_list(ports)),
        ],
        Event::Rejected {
            step,
            payload,
            reason,
        } => vec![
            event.kind().to_string(),
            step.to_string(),
            String::new(),
            payload.clone(),
            reason.clone(),
        ],
        Event::Stalled {
            sender,
            queued,
            sender_ready,
            sender_closed,
            port_closed,
        } => vec![
            event.kind().to_string(),
            queued.to_string(),
            sender.clone(),
            String::new(),
            format!(
                "sender_ready={sender_ready} sender_closed={sender_closed} \
                 port_closed={port_closed}"
            ),
        ],
    }
}

fn pretty_line(event: &Event) -> String {
    match event {
        Event::Delivered {
            seq,
            destination,
            payload,
            target_origin,
            ports,
        } => format!(
            "#{seq} -> {destination} origin={target_origin} ports=[{}] payload={payload}",
            port_list(ports)
        ),
        Event::Rejected {
            step,
            payload,
            reason,
        } => format!("step {step} rejected: {reason} payload={payload}"),
        Event::Stalled {
            sender,
            queued,
            sender_ready,
            sender_closed,
            port_closed,
        } => format!(
            "{sender} stalled: queued={queued} sender_ready={sender_ready} \
             sender_closed={sender_closed} port_closed={port_closed}"
        ),
    }
}

fn port_list(ports: &[PortId]) -> String {
    ports
        .iter()
        .map(PortId::to_string)
        .collect::<Vec<_>>()
        .join(",")
}
