use std::fs;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use jclassfile::class_file;
use jclassfile::constant_pool::ConstantPool;
use serde_json::Value;
use serde_sarif::sarif::{Artifact, ArtifactLocation, ArtifactRoles};
use tracing::{debug, warn};
use zip::ZipArchive;

use crate::ir::{CallKind, Class, FieldOp, LineNumber, MemberRef, Method, RefKind};
use crate::opcodes;

/// Snapshot of parsed artifacts, classes, and counts for a scan.
pub(crate) struct ScanOutput {
    pub(crate) artifacts: Vec<Artifact>,
    pub(crate) class_count: usize,
    pub(crate) classes: Vec<Class>,
}

/// Accumulates scan results while walking inputs.
#[derive(Default)]
struct ScanState {
    artifacts: Vec<Artifact>,
    class_count: usize,
    classes: Vec<Class>,
}

pub(crate) fn scan_inputs(input: &Path) -> Result<ScanOutput> {
    let mut state = ScanState::default();
    scan_path(input, true, &mut state)?;
    debug!(
        input = %input.display(),
        classes = state.class_count,
        "scan finished"
    );
    Ok(ScanOutput {
        artifacts: state.artifacts,
        class_count: state.class_count,
        classes: state.classes,
    })
}

fn scan_path(path: &Path, is_input: bool, state: &mut ScanState) -> Result<()> {
    if path.is_dir() {
        return scan_dir(path, state);
    }

    let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");
    match extension {
        "class" => scan_class_file(path, is_input, state),
        "jar" => scan_jar_file(path, is_input, state),
        _ => {
            if is_input {
                anyhow::bail!("unsupported input file: {}", path.display())
            } else {
                Ok(())
            }
        }
    }
}

fn scan_dir(path: &Path, state: &mut ScanState) -> Result<()> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(path)
        .with_context(|| format!("failed to read directory {}", path.display()))?
    {
        let entry =
            entry.with_context(|| format!("failed to read entry under {}", path.display()))?;
        entries.push(entry.path());
    }

    // Keep deterministic ordering across platforms.
    entries.sort_by(|a, b| path_key(a).cmp(&path_key(b)));

    for entry in entries {
        if entry.is_dir() {
            scan_dir(&entry, state)?;
        } else {
            scan_path(&entry, false, state)?;
        }
    }

    Ok(())
}

fn scan_class_file(path: &Path, is_input: bool, state: &mut ScanState) -> Result<()> {
    let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let parsed = match parse_class_bytes(&data) {
        Ok(parsed) => parsed,
        Err(err) if !is_input => {
            warn!(path = %path.display(), error = ?err, "skipping unparseable class file");
            return Ok(());
        }
        Err(err) => return Err(err).with_context(|| format!("failed to parse {}", path.display())),
    };
    state.class_count += 1;

    let artifact_index = push_path_artifact(path, roles(is_input), data.len() as u64, state);
    state.classes.push(Class {
        name: parsed.name,
        methods: parsed.methods,
        artifact_index,
    });
    Ok(())
}

fn scan_jar_file(path: &Path, is_input: bool, state: &mut ScanState) -> Result<()> {
    let file = fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut archive = match ZipArchive::new(file) {
        Ok(archive) => archive,
        Err(err) if !is_input => {
            warn!(path = %path.display(), error = %err, "skipping unreadable jar");
            return Ok(());
        }
        Err(err) => return Err(err).with_context(|| format!("failed to read {}", path.display())),
    };

    let jar_len = fs::metadata(path)
        .with_context(|| format!("failed to read {}", path.display()))?
        .len();
    let jar_index = push_path_artifact(path, roles(is_input), jar_len, state);

    let mut entry_names = Vec::new();
    for index in 0..archive.len() {
        let entry = archive
            .by_index(index)
            .with_context(|| format!("failed to read {}", path.display()))?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        if name.ends_with(".class")
            && !name.ends_with("module-info.class")
            && !name.starts_with("META-INF/versions/")
        {
            entry_names.push(name);
        }
    }

    entry_names.sort();

    for name in entry_names {
        let mut entry = archive
            .by_name(&name)
            .with_context(|| format!("failed to read {}:{}", path.display(), name))?;
        let mut data = Vec::new();
        entry
            .read_to_end(&mut data)
            .with_context(|| format!("failed to read {}:{}", path.display(), name))?;
        let parsed = match parse_class_bytes(&data) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(
                    jar = %path.display(),
                    entry = %name,
                    error = ?err,
                    "skipping unparseable jar entry"
                );
                continue;
            }
        };
        state.class_count += 1;
        state.classes.push(Class {
            name: parsed.name,
            methods: parsed.methods,
            artifact_index: jar_index,
        });
    }

    Ok(())
}

fn roles(is_input: bool) -> Option<Vec<Value>> {
    if !is_input {
        return None;
    }
    serde_json::to_value(ArtifactRoles::AnalysisTarget)
        .ok()
        .map(|role| vec![role])
}

/// Push a path-based artifact and return its index for class linkage.
fn push_path_artifact(
    path: &Path,
    roles: Option<Vec<Value>>,
    len: u64,
    state: &mut ScanState,
) -> i64 {
    let location = ArtifactLocation::builder().uri(path_to_uri(path)).build();
    let artifact = match roles {
        Some(roles) => Artifact::builder()
            .location(location)
            .length(len as i64)
            .roles(roles)
            .build(),
        None => Artifact::builder()
            .location(location)
            .length(len as i64)
            .build(),
    };
    let index = state.artifacts.len() as i64;
    state.artifacts.push(artifact);
    index
}

fn path_to_uri(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// Parsed class data extracted from class file bytes.
struct ParsedClass {
    name: String,
    methods: Vec<Method>,
}

fn parse_class_bytes(data: &[u8]) -> Result<ParsedClass> {
    let class_file = class_file::parse(data).context("failed to parse class file bytes")?;
    let constant_pool = class_file.constant_pool();
    let name =
        resolve_class_name(constant_pool, class_file.this_class()).context("resolve class name")?;
    let methods =
        parse_methods(constant_pool, class_file.methods()).context("parse method bytecode")?;
    Ok(ParsedClass { name, methods })
}

fn parse_methods(
    constant_pool: &[ConstantPool],
    methods: &[jclassfile::methods::MethodInfo],
) -> Result<Vec<Method>> {
    let mut parsed = Vec::new();
    for method in methods {
        let name =
            resolve_utf8(constant_pool, method.name_index()).context("resolve method name")?;
        let descriptor = resolve_utf8(constant_pool, method.descriptor_index())
            .context("resolve method descriptor")?;
        let code = method
            .attributes()
            .iter()
            .find_map(|attribute| match attribute {
                jclassfile::attributes::Attribute::Code {
                    code, attributes, ..
                } => Some((code, attributes)),
                _ => None,
            });
        let Some((code, code_attributes)) = code else {
            continue;
        };
        let references = parse_bytecode(code, constant_pool)
            .with_context(|| format!("parse bytecode of {name}{descriptor}"))?;
        parsed.push(Method {
            name,
            descriptor,
            line_numbers: parse_line_numbers(code_attributes),
            references,
        });
    }
    Ok(parsed)
}

fn parse_line_numbers(attributes: &[jclassfile::attributes::Attribute]) -> Vec<LineNumber> {
    let mut entries = Vec::new();
    for attribute in attributes {
        let jclassfile::attributes::Attribute::LineNumberTable { line_number_table } = attribute
        else {
            continue;
        };
        for record in line_number_table {
            entries.push(LineNumber {
                start_pc: record.start_pc() as u32,
                line: record.line_number() as u32,
            });
        }
    }
    entries.sort_by_key(|entry| entry.start_pc);
    entries
}

/// Walk method bytecode and collect every method invocation and field access.
fn parse_bytecode(code: &[u8], constant_pool: &[ConstantPool]) -> Result<Vec<MemberRef>> {
    let mut references = Vec::new();
    let mut offset = 0usize;
    while offset < code.len() {
        let opcode = code[offset];
        let length = opcode_length(code, offset)?;
        if length == 0 || offset + length > code.len() {
            anyhow::bail!("invalid bytecode length at offset {}", offset);
        }
        let kind = match opcode {
            opcodes::INVOKEVIRTUAL => Some(RefKind::Invoke(CallKind::Virtual)),
            opcodes::INVOKESPECIAL => Some(RefKind::Invoke(CallKind::Special)),
            opcodes::INVOKESTATIC => Some(RefKind::Invoke(CallKind::Static)),
            opcodes::INVOKEINTERFACE => Some(RefKind::Invoke(CallKind::Interface)),
            opcodes::GETSTATIC => Some(RefKind::Field(FieldOp::GetStatic)),
            opcodes::PUTSTATIC => Some(RefKind::Field(FieldOp::PutStatic)),
            opcodes::GETFIELD => Some(RefKind::Field(FieldOp::GetField)),
            opcodes::PUTFIELD => Some(RefKind::Field(FieldOp::PutField)),
            _ => None,
        };
        if let Some(kind) = kind {
            let index = read_u16(code, offset + 1)?;
            let member = resolve_member_ref(constant_pool, index, kind)
                .with_context(|| format!("resolve member ref at offset {offset}"))?;
            references.push(MemberRef {
                owner: member.owner,
                name: member.name,
                descriptor: member.descriptor,
                kind,
                offset: offset as u32,
            });
        }
        offset += length;
    }
    Ok(references)
}

/// Resolved constant pool member reference.
struct ResolvedMember {
    owner: String,
    name: String,
    descriptor: String,
}

fn resolve_member_ref(
    constant_pool: &[ConstantPool],
    index: u16,
    kind: RefKind,
) -> Result<ResolvedMember> {
    let entry = constant_pool
        .get(index as usize)
        .context("missing member ref entry")?;
    let (class_index, name_and_type_index) = match (kind, entry) {
        (
            RefKind::Invoke(_),
            ConstantPool::Methodref {
                class_index,
                name_and_type_index,
            },
        )
        | (
            RefKind::Invoke(_),
            ConstantPool::InterfaceMethodref {
                class_index,
                name_and_type_index,
            },
        )
        | (
            RefKind::Field(_),
            ConstantPool::Fieldref {
                class_index,
                name_and_type_index,
            },
        ) => (*class_index, *name_and_type_index),
        _ => anyhow::bail!("unexpected member ref entry"),
    };
    let owner = resolve_class_name(constant_pool, class_index).context("resolve owner")?;
    let (name_index, descriptor_index) = resolve_name_and_type(constant_pool, name_and_type_index)?;
    let name = resolve_utf8(constant_pool, name_index).context("resolve member name")?;
    let descriptor =
        resolve_utf8(constant_pool, descriptor_index).context("resolve member descriptor")?;
    Ok(ResolvedMember {
        owner,
        name,
        descriptor,
    })
}

fn resolve_class_name(constant_pool: &[ConstantPool], class_index: u16) -> Result<String> {
    let entry = constant_pool
        .get(class_index as usize)
        .context("missing class entry")?;
    match entry {
        ConstantPool::Class { name_index } => resolve_utf8(constant_pool, *name_index),
        _ => anyhow::bail!("unexpected class entry"),
    }
}

fn resolve_utf8(constant_pool: &[ConstantPool], index: u16) -> Result<String> {
    let entry = constant_pool
        .get(index as usize)
        .context("missing utf8 entry")?;
    match entry {
        ConstantPool::Utf8 { value } => Ok(value.clone()),
        _ => anyhow::bail!("unexpected utf8 entry"),
    }
}

fn resolve_name_and_type(constant_pool: &[ConstantPool], index: u16) -> Result<(u16, u16)> {
    let entry = constant_pool
        .get(index as usize)
        .context("missing name and type entry")?;
    match entry {
        ConstantPool::NameAndType {
            name_index,
            descriptor_index,
        } => Ok((*name_index, *descriptor_index)),
        _ => anyhow::bail!("unexpected name and type entry"),
    }
}

fn opcode_length(code: &[u8], offset: usize) -> Result<usize> {
    let opcode = code[offset];
    let length = match opcode {
        0x00..=0x0f => 1,
        0x10 => 2,
        0x11 => 3,
        opcodes::LDC => 2,
        opcodes::LDC_W | opcodes::LDC2_W => 3,
        0x15..=0x19 => 2,
        0x1a..=0x35 => 1,
        0x36..=0x3a => 2,
        0x3b..=0x83 => 1,
        0x84 => 3,
        0x85..=0x98 => 1,
        0x99..=0xa6 => 3,
        opcodes::GOTO | opcodes::JSR => 3,
        0xa9 => 2,
        opcodes::TABLESWITCH => tableswitch_length(code, offset)?,
        opcodes::LOOKUPSWITCH => lookupswitch_length(code, offset)?,
        0xac..=0xb1 => 1,
        opcodes::GETSTATIC..=opcodes::PUTFIELD => 3,
        opcodes::INVOKEVIRTUAL | opcodes::INVOKESPECIAL | opcodes::INVOKESTATIC => 3,
        opcodes::INVOKEINTERFACE | opcodes::INVOKEDYNAMIC => 5,
        0xbb => 3,
        0xbc => 2,
        0xbd => 3,
        0xbe | 0xbf => 1,
        0xc0 | 0xc1 => 3,
        0xc2 | 0xc3 => 1,
        opcodes::WIDE => wide_length(code, offset)?,
        0xc5 => 4,
        0xc6 | 0xc7 => 3,
        opcodes::GOTO_W | opcodes::JSR_W => 5,
        0xca => 1,
        0xfe | 0xff => 1,
        _ => anyhow::bail!("unsupported opcode 0x{:02x}", opcode),
    };
    Ok(length)
}

fn tableswitch_length(code: &[u8], offset: usize) -> Result<usize> {
    let padding = padding(offset);
    let base = offset + 1 + padding;
    let low = read_i32(code, base + 4)?;
    let high = read_i32(code, base + 8)?;
    let count = high
        .checked_sub(low)
        .and_then(|v| v.checked_add(1))
        .context("invalid tableswitch range")?;
    if count < 0 {
        anyhow::bail!("invalid tableswitch range");
    }
    Ok(1 + padding + 12 + (count as usize) * 4)
}

fn lookupswitch_length(code: &[u8], offset: usize) -> Result<usize> {
    let padding = padding(offset);
    let base = offset + 1 + padding;
    let npairs = read_i32(code, base + 4)?;
    if npairs < 0 {
        anyhow::bail!("invalid lookupswitch pairs");
    }
    Ok(1 + padding + 8 + (npairs as usize) * 8)
}

fn wide_length(code: &[u8], offset: usize) -> Result<usize> {
    let opcode = code
        .get(offset + 1)
        .copied()
        .context("missing wide opcode")?;
    if opcode == 0x84 { Ok(6) } else { Ok(4) }
}

fn padding(offset: usize) -> usize {
    (4 - ((offset + 1) % 4)) % 4
}

fn read_u16(code: &[u8], offset: usize) -> Result<u16> {
    let slice = code
        .get(offset..offset + 2)
        .context("bytecode u16 out of bounds")?;
    Ok(u16::from_be_bytes([slice[0], slice[1]]))
}

fn read_i32(code: &[u8], offset: usize) -> Result<i32> {
    let slice = code
        .get(offset..offset + 4)
        .context("bytecode i32 out of bounds")?;
    Ok(i32::from_be_bytes([slice[0], slice[1], slice[2], slice[3]]))
}
