use std::collections::HashMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use msgports::port::{ChannelId, MessagePort, PortRegistry, PortService, RegistryConfig};
use msgports::sender::{
    ChannelDelivery, Dispatcher, FrameTarget, PortTarget, PostMessageSender, ReadinessObserver,
    RemoteDelivery, ResolvedMessage,
};
use msgports::wire::WireWriter;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::cmd::ReplayArgs;
use crate::exit::{
    io_error, json_error, port_error, CliError, CliResult, DATA_INVALID, FAILURE, SUCCESS,
};
use crate::output::{print_events, Event, OutputFormat};

const FRAME_SENDER: &str = "frames";

/// A scenario: steps run in order against one registry.
#[derive(Debug, Deserialize)]
pub struct Script {
    /// First identity the registry hands out.
    #[serde(default)]
    pub first_port_id: Option<u32>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Create an entangled pair. The channel and both ports get script names.
    CreateChannel { name: String, ports: [String; 2] },
    /// Post a message, to a frame by default or through a named port.
    Post {
        #[serde(default)]
        destination: String,
        payload: String,
        #[serde(default = "any_origin")]
        target_origin: String,
        #[serde(default)]
        ports: Vec<String>,
        #[serde(default)]
        via: Option<String>,
    },
    Close { port: String },
    /// Complete negotiation for one channel.
    Ready { channel: String },
    ReadyAll,
}

fn any_origin() -> String {
    "*".to_string()
}

/// What a replay produced, in the order it happened.
#[derive(Debug, Default)]
pub struct Report {
    pub events: Vec<Event>,
    pub delivered: Vec<ResolvedMessage>,
    pub rejected: usize,
}

pub fn run(args: ReplayArgs, format: OutputFormat) -> CliResult<i32> {
    let text = std::fs::read_to_string(&args.script)
        .map_err(|err| io_error("read script", err))?;
    let script: Script =
        serde_json::from_str(&text).map_err(|err| json_error("parse script", err))?;
    info!(
        script = %args.script.display(),
        steps = script.steps.len(),
        "replaying"
    );

    let report = replay(script)?;
    print_events(&report.events, format);

    if let Some(path) = &args.out {
        write_capture(path, &report.delivered)?;
    }

    if args.strict && report.rejected > 0 {
        return Err(CliError::new(
            DATA_INVALID,
            format!("{} post(s) rejected", report.rejected),
        ));
    }
    Ok(SUCCESS)
}

/// Run every step and collect the resulting events.
pub fn replay(script: Script) -> CliResult<Report> {
    let mut config = RegistryConfig::default();
    if let Some(first) = script.first_port_id {
        config.first_port_id = first;
    }
    let mut session = Session::new(config);

    for (index, step) in script.steps.into_iter().enumerate() {
        session.apply(index + 1, step)?;
        session.pump();
        session.collect();
    }

    session.finish();
    Ok(session.report)
}

fn write_capture(path: &Path, messages: &[ResolvedMessage]) -> CliResult<()> {
    let file = File::create(path).map_err(|err| io_error("create capture", err))?;
    let mut writer = WireWriter::new(BufWriter::new(file));
    for message in messages {
        writer.deliver(message.clone());
    }
    if writer.failures() > 0 {
        return Err(CliError::new(
            FAILURE,
            format!(
                "write capture: {} of {} message(s) failed",
                writer.failures(),
                messages.len()
            ),
        ));
    }
    debug!(path = %path.display(), written = writer.written(), "wrote capture");
    Ok(())
}

struct Session {
    service: Arc<PortService>,
    dispatcher: Dispatcher,
    frames: PostMessageSender<FrameTarget, ChannelDelivery>,
    via: Vec<(String, PostMessageSender<PortTarget, ChannelDelivery>)>,
    ports: HashMap<String, MessagePort>,
    channels: HashMap<String, ChannelId>,
    tx: Sender<ResolvedMessage>,
    rx: Receiver<ResolvedMessage>,
    report: Report,
}

impl Session {
    fn new(config: RegistryConfig) -> Self {
        let service = Arc::new(PortService::with_config(config));
        let dispatcher = Dispatcher::new(service.subscribe());
        let (tx, rx) = crossbeam_channel::unbounded();
        let frames =
            PostMessageSender::for_frames(ChannelDelivery::new(tx.clone()), registry(&service));
        Self {
            service,
            dispatcher,
            frames,
            via: Vec::new(),
            ports: HashMap::new(),
            channels: HashMap::new(),
            tx,
            rx,
            report: Report::default(),
        }
    }

    fn apply(&mut self, step: usize, op: Step) -> CliResult<()> {
        match op {
            Step::CreateChannel { name, ports } => {
                if self.channels.contains_key(&name) {
                    return Err(CliError::script(
                        step,
                        format!("channel {name:?} already exists"),
                    ));
                }
                let [first_name, second_name] = ports;
                for port_name in [&first_name, &second_name] {
                    if self.ports.contains_key(port_name) {
                        return Err(CliError::script(
                            step,
                            format!("port {port_name:?} already exists"),
                        ));
                    }
                }
                let (first, second) = self.service.create_entangled_pair();
                debug!(step, channel = %first.channel(), %name, "created channel");
                self.channels.insert(name, first.channel());
                self.ports.insert(first_name, first);
                self.ports.insert(second_name, second);
            }
            Step::Post {
                destination,
                payload,
                target_origin,
                ports,
                via,
            } => {
                let transfer = ports
                    .iter()
                    .map(|name| self.port(step, name))
                    .collect::<CliResult<Vec<_>>>()?;
                let result = match via {
                    None => self.frames.post_message(
                        &destination,
                        payload.clone(),
                        &target_origin,
                        transfer,
                    ),
                    Some(name) => self.port_sender(step, &name)?.post_message(
                        &destination,
                        payload.clone(),
                        &target_origin,
                        transfer,
                    ),
                };
                match result {
                    Ok(outcome) => debug!(step, ?outcome, "posted"),
                    Err(err) => {
                        warn!(step, error = %err, "post rejected");
                        self.report.rejected += 1;
                        self.report.events.push(Event::Rejected {
                            step,
                            payload,
                            reason: err.to_string(),
                        });
                    }
                }
            }
            Step::Close { port } => {
                self.port(step, &port)?.close();
                debug!(step, %port, "closed port");
            }
            Step::Ready { channel } => {
                let id = *self.channels.get(&channel).ok_or_else(|| {
                    CliError::script(step, format!("unknown channel {channel:?}"))
                })?;
                self.service
                    .complete_channel(id)
                    .map_err(|err| port_error(step, err))?;
            }
            Step::ReadyAll => {
                let completed = self.service.complete_all_pending();
                debug!(step, completed, "completed pending channels");
            }
        }
        Ok(())
    }

    fn port(&self, step: usize, name: &str) -> CliResult<MessagePort> {
        self.ports
            .get(name)
            .cloned()
            .ok_or_else(|| CliError::script(step, format!("unknown port {name:?}")))
    }

    fn port_sender(
        &mut self,
        step: usize,
        name: &str,
    ) -> CliResult<&mut PostMessageSender<PortTarget, ChannelDelivery>> {
        let index = match self.via.iter().position(|(existing, _)| existing == name) {
            Some(index) => index,
            None => {
                let port = self.port(step, name)?;
                let sender = PostMessageSender::for_port(
                    port,
                    ChannelDelivery::new(self.tx.clone()),
                    registry(&self.service),
                );
                self.via.push((name.to_string(), sender));
                self.via.len() - 1
            }
        };
        Ok(&mut self.via[index].1)
    }

    fn pump(&mut self) {
        let mut observers: Vec<&mut dyn ReadinessObserver> =
            Vec::with_capacity(1 + self.via.len());
        observers.push(&mut self.frames);
        for (_, sender) in self.via.iter_mut() {
            observers.push(sender);
        }
        self.dispatcher.pump(&mut observers);
    }

    fn collect(&mut self) {
        for message in self.rx.try_iter() {
            let seq = self.report.delivered.len() + 1;
            self.report.events.push(Event::delivered(seq, &message));
            self.report.delivered.push(message);
        }
    }

    fn finish(&mut self) {
        let frames = self.frames.stall().map(|stall| (FRAME_SENDER, stall));
        let via = self
            .via
            .iter()
            .filter_map(|(name, sender)| sender.stall().map(|stall| (name.as_str(), stall)));

        for (sender, stall) in frames.into_iter().chain(via) {
            warn!(
                sender,
                queued = stall.queued,
                permanent = stall.is_permanent(),
                "messages still queued at end of script"
            );
            self.report.events.push(Event::Stalled {
                sender: sender.to_string(),
                queued: stall.queued,
                sender_ready: stall.sender_ready,
                sender_closed: stall.sender_closed,
                port_closed: stall.port_closed,
            });
        }
    }
}

fn registry(service: &Arc<PortService>) -> Arc<dyn PortRegistry> {
    service.clone()
}

#[cfg(test)]
mod tests {
    use msgports::port::PortId;

    use super::*;

    fn script(json: &str) -> Script {
        serde_json::from_str(json).expect("script should parse")
    }

    fn delivered_payloads(report: &Report) -> Vec<&str> {
        report
            .delivered
            .iter()
            .map(|message| message.payload.as_str())
            .collect()
    }

    #[test]
    fn queued_posts_are_delivered_in_post_order() {
        let report = replay(script(
            r#"{"steps": [
                {"op": "create_channel", "name": "a", "ports": ["a1", "a2"]},
                {"op": "post", "destination": "child", "payload": "1", "ports": ["a2"]},
                {"op": "post", "destination": "child", "payload": "2"},
                {"op": "post", "destination": "child", "payload": "3"},
                {"op": "ready", "channel": "a"}
            ]}"#,
        ))
        .unwrap();

        assert_eq!(delivered_payloads(&report), vec!["1", "2", "3"]);
        assert_eq!(report.delivered[0].ports, vec![PortId::new(2)]);
        assert_eq!(report.rejected, 0);
    }

    #[test]
    fn second_transfer_is_reported_as_rejection() {
        let report = replay(script(
            r#"{"steps": [
                {"op": "create_channel", "name": "a", "ports": ["a1", "a2"]},
                {"op": "post", "payload": "first", "ports": ["a2"]},
                {"op": "post", "payload": "again", "ports": ["a2"]},
                {"op": "ready_all"}
            ]}"#,
        ))
        .unwrap();

        assert_eq!(report.rejected, 1);
        assert_eq!(delivered_payloads(&report), vec!["first"]);
        assert!(matches!(
            &report.events[0],
            Event::Rejected { step: 3, payload, .. } if payload == "again"
        ));
    }

    #[test]
    fn post_through_port_waits_for_its_channel() {
        let report = replay(script(
            r#"{"first_port_id": 100, "steps": [
                {"op": "create_channel", "name": "a", "ports": ["a1", "a2"]},
                {"op": "post", "via": "a1", "payload": "hello"},
                {"op": "ready", "channel": "a"}
            ]}"#,
        ))
        .unwrap();

        assert_eq!(delivered_payloads(&report), vec!["hello"]);
        assert_eq!(report.delivered[0].destination, "100");
    }

    #[test]
    fn closed_queued_port_stalls_the_frame_sender() {
        let report = replay(script(
            r#"{"steps": [
                {"op": "create_channel", "name": "a", "ports": ["a1", "a2"]},
                {"op": "post", "payload": "1", "ports": ["a2"]},
                {"op": "post", "payload": "2"},
                {"op": "close", "port": "a2"},
                {"op": "ready_all"}
            ]}"#,
        ))
        .unwrap();

        assert!(report.delivered.is_empty());
        assert_eq!(
            report.events,
            vec![Event::Stalled {
                sender: FRAME_SENDER.to_string(),
                queued: 2,
                sender_ready: true,
                sender_closed: false,
                port_closed: true,
            }]
        );
    }

    #[test]
    fn closed_sending_port_stalls_its_sender() {
        let report = replay(script(
            r#"{"steps": [
                {"op": "create_channel", "name": "a", "ports": ["a1", "a2"]},
                {"op": "post", "via": "a1", "payload": "stuck"},
                {"op": "close", "port": "a1"},
                {"op": "ready_all"}
            ]}"#,
        ))
        .unwrap();

        assert!(report.delivered.is_empty());
        assert_eq!(
            report.events,
            vec![Event::Stalled {
                sender: "a1".to_string(),
                queued: 1,
                sender_ready: false,
                sender_closed: true,
                port_closed: false,
            }]
        );
    }

    #[test]
    fn posting_through_transferred_port_is_rejected() {
        let report = replay(script(
            r#"{"steps": [
                {"op": "create_channel", "name": "a", "ports": ["a1", "a2"]},
                {"op": "ready_all"},
                {"op": "post", "payload": "handoff", "ports": ["a1"]},
                {"op": "post", "via": "a1", "payload": "after"}
            ]}"#,
        ))
        .unwrap();

        assert_eq!(report.rejected, 1);
        assert_eq!(delivered_payloads(&report), vec!["handoff"]);
        assert!(matches!(
            &report.events[1],
            Event::Rejected { step: 4, reason, .. } if reason.contains("transferred")
        ));
    }

    #[test]
    fn unknown_port_is_a_script_error() {
        let err = replay(script(
            r#"{"steps": [{"op": "post", "payload": "x", "ports": ["nope"]}]}"#,
        ))
        .unwrap_err();

        assert_eq!(err.code, DATA_INVALID);
        assert!(err.message.contains("step 1"));
    }

    #[test]
    fn readying_a_channel_twice_is_a_script_error() {
        let err = replay(script(
            r#"{"steps": [
                {"op": "create_channel", "name": "a", "ports": ["a1", "a2"]},
                {"op": "ready", "channel": "a"},
                {"op": "ready", "channel": "a"}
            ]}"#,
        ))
        .unwrap_err();

        assert_eq!(err.code, DATA_INVALID);
        assert!(err.message.contains("step 3"));
    }
}
