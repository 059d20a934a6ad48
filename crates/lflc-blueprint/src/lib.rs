//! Serialises a compiled instruction list as a program-ROM blueprint.
//!
//! Each ROM slot becomes two combinators: a decider that matches the
//! program-counter signal `P` against the slot's 1-based address, and a
//! constant combinator holding the instruction itself: opcode on the `O`
//! signal and, when the instruction has an operand, the `A` (address) or
//! `D` (immediate) signal. The deciders are daisy-chained on red wire so a
//! single probe reads the whole ROM.
//!
//! The exchange string is the blueprint JSON, zlib-compressed, base64
//! encoded, prefixed with the format version character.

use std::io::Write;

use anyhow::{Context, Result};
use base64::Engine;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use lflc_codegen::isa::{Instruction, OperandKind};

/// Version character prefixed to every exchange string.
const VERSION_PREFIX: char = '0';

#[derive(Serialize, Deserialize)]
pub struct BlueprintEnvelope {
    pub blueprint: Blueprint,
}

#[derive(Serialize, Deserialize)]
pub struct Blueprint {
    pub item: String,
    pub label: String,
    pub entities: Vec<Entity>,
    pub version: u32,
}

#[derive(Serialize, Deserialize)]
pub struct Entity {
    pub entity_number: u32,
    pub name: String,
    pub position: Position,
    pub direction: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connections: Option<Connection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control_behavior: Option<ControlBehavior>,
}

#[derive(Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

/// Circuit connections, keyed by the entity's connector id.
#[derive(Serialize, Deserialize)]
pub struct Connection {
    #[serde(rename = "1", skip_serializing_if = "Option::is_none")]
    pub input: Option<ConnectionPoint>,
    #[serde(rename = "2", skip_serializing_if = "Option::is_none")]
    pub output: Option<ConnectionPoint>,
}

#[derive(Serialize, Deserialize)]
pub struct ConnectionPoint {
    pub red: Vec<ConnectionData>,
    pub green: Vec<ConnectionData>,
}

#[derive(Serialize, Deserialize)]
pub struct ConnectionData {
    pub entity_id: u32,
    pub circuit_id: u32,
}

#[derive(Serialize, Deserialize)]
pub struct ControlBehavior {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decider_conditions: Option<DeciderConditions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<Vec<ConstantFilter>>,
}

#[derive(Serialize, Deserialize)]
pub struct DeciderConditions {
    pub comparator: char,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_signal: Option<SignalId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub second_signal: Option<SignalId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constant: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_signal: Option<SignalId>,
    pub copy_count_from_input: bool,
}

#[derive(Serialize, Deserialize)]
pub struct ConstantFilter {
    pub signal: SignalId,
    pub count: i32,
    pub index: u32,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct SignalId {
    pub r#type: String,
    pub name: String,
}

fn virtual_signal(name: &str) -> SignalId {
    SignalId {
        r#type: "virtual".to_string(),
        name: name.to_string(),
    }
}

/// The signals a single instruction occupies on its constant combinator.
fn instruction_filters(inst: &Instruction) -> Vec<ConstantFilter> {
    let mut filters = vec![ConstantFilter {
        signal: virtual_signal("signal-O"),
        count: inst.opcode(),
        index: 1,
    }];

    if let Some(kind) = inst.operand_kind() {
        let signal = match kind {
            OperandKind::Address => virtual_signal("signal-A"),
            OperandKind::Immediate => virtual_signal("signal-D"),
        };
        filters.push(ConstantFilter {
            signal,
            count: inst.operand(),
            index: 2,
        });
    }

    filters
}

/// Build the ROM blueprint for a compiled program.
pub fn rom_blueprint(instructions: &[Instruction]) -> Blueprint {
    let mut entities = Vec::with_capacity(instructions.len() * 2);

    for (idx, inst) in instructions.iter().enumerate() {
        let decider_number = entities.len() as u32 + 1;

        // Address matcher: passes the instruction through when the
        // program counter equals this slot's address.
        entities.push(Entity {
            entity_number: decider_number,
            name: "decider-combinator".to_string(),
            position: Position {
                x: 0.0,
                y: -(idx as f32),
            },
            direction: 2,
            // Chain to the previous slot's decider on both connectors.
            connections: (idx > 0).then(|| Connection {
                input: Some(ConnectionPoint {
                    red: vec![ConnectionData {
                        entity_id: decider_number - 2,
                        circuit_id: 1,
                    }],
                    green: vec![],
                }),
                output: Some(ConnectionPoint {
                    red: vec![ConnectionData {
                        entity_id: decider_number - 2,
                        circuit_id: 2,
                    }],
                    green: vec![],
                }),
            }),
            control_behavior: Some(ControlBehavior {
                decider_conditions: Some(DeciderConditions {
                    comparator: '=',
                    first_signal: Some(virtual_signal("signal-P")),
                    second_signal: None,
                    constant: Some(idx as i32 + 1), // ROM is 1-indexed
                    output_signal: Some(virtual_signal("signal-everything")),
                    copy_count_from_input: true,
                }),
                filters: None,
            }),
        });

        // The instruction itself, feeding the matcher on green wire.
        entities.push(Entity {
            entity_number: decider_number + 1,
            name: "constant-combinator".to_string(),
            position: Position {
                x: -2.0,
                y: -(idx as f32),
            },
            direction: 1,
            connections: Some(Connection {
                input: Some(ConnectionPoint {
                    red: vec![],
                    green: vec![ConnectionData {
                        entity_id: decider_number,
                        circuit_id: 1,
                    }],
                }),
                output: None,
            }),
            control_behavior: Some(ControlBehavior {
                decider_conditions: None,
                filters: Some(instruction_filters(inst)),
            }),
        });
    }

    Blueprint {
        item: "blueprint".to_string(),
        label: "Program".to_string(),
        entities,
        version: 0,
    }
}

impl BlueprintEnvelope {
    /// Render the blueprint as an exchange string.
    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize blueprint")?;

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
        encoder
            .write_all(json.as_bytes())
            .and_then(|_| encoder.finish())
            .context("failed to compress blueprint")
            .map(|compressed| {
                let encoded = base64::engine::general_purpose::STANDARD_NO_PAD.encode(compressed);
                format!("{VERSION_PREFIX}{encoded}")
            })
    }
}

/// Compile-to-string convenience used by the driver.
pub fn encode_rom(instructions: &[Instruction]) -> Result<String> {
    BlueprintEnvelope {
        blueprint: rom_blueprint(instructions),
    }
    .encode()
}
