// SPDX-License-Identifier: MIT

use lazy_static::lazy_static;
use termcolor::{Color, ColorSpec, WriteColor};

use crate::diff::*;

#[derive(Default)]
struct Colors {
    default: ColorSpec,
    removed: ColorSpec,
    added: ColorSpec,
    modified_old: ColorSpec,
    modified_new: ColorSpec,
    moved: ColorSpec,
    moved_modified: ColorSpec,
    part_removed: ColorSpec,
    part_added: ColorSpec,
    footer: ColorSpec,
}
impl Colors {
    fn new() -> Self {
        let mut colors = Colors {
            ..Default::default()
        };
        colors.removed.set_fg(Some(Color::Red));
        colors.added.set_fg(Some(Color::Green));
        colors.modified_old.set_fg(Some(Color::Yellow)).set_dimmed(true);
        colors.modified_new.set_fg(Some(Color::Yellow));
        colors.moved.set_fg(Some(Color::Cyan));
        colors.moved_modified.set_fg(Some(Color::Magenta));
        colors.part_removed.set_fg(Some(Color::Red)).set_bold(true);
        colors.part_added.set_fg(Some(Color::Green)).set_bold(true);
        colors.footer.set_bold(true);
        colors
    }
}
lazy_static! {
    static ref COLORS: Colors = Colors::new();
}

fn get_line_color(class: LineClass) -> &'static ColorSpec {
    match class {
        LineClass::Unchanged => &COLORS.default,
        LineClass::Added => &COLORS.added,
        LineClass::Removed => &COLORS.removed,
        LineClass::Modified => &COLORS.modified_new,
        LineClass::Moved => &COLORS.moved,
        LineClass::MovedModified => &COLORS.moved_modified,
    }
}

/// The one-character marker printed in front of an entry.
pub fn marker(entry: &ClassifiedEntry) -> char {
    match entry.class {
        LineClass::Unchanged => ' ',
        LineClass::Removed => '-',
        LineClass::Added => '+',
        LineClass::Modified => '~',
        LineClass::Moved => match entry.move_info.map(|info| info.role) {
            Some(MoveRole::Source) => '<',
            _ => '>',
        },
        LineClass::MovedModified => '*',
    }
}

#[derive(Debug)]
enum Element {
    Entry(ClassifiedEntry),
    Footer {
        stats: Stats,
        moves: (usize, usize, usize),
        limit_info: ComplexityDecision,
    },
}

/// Collects classified output and renders it to a terminal.
#[derive(Default)]
pub struct Writer {
    elements: Vec<Element>,
    modes: ModeToggles,
}
impl Writer {
    pub fn new(modes: ModeToggles) -> Self {
        Self {
            elements: Vec::new(),
            modes,
        }
    }

    pub fn push_output(&mut self, output: &ClassifyOutput) {
        self.elements
            .extend(output.results.iter().cloned().map(Element::Entry));
    }

    pub fn push_footer(&mut self, output: &ClassifyOutput) {
        self.elements.push(Element::Footer {
            stats: output.stats,
            moves: (
                output.moves.block_moves.len(),
                output.moves.line_moves.len(),
                output.moves.cross_block.len(),
            ),
            limit_info: output.limit_info,
        });
    }

    pub fn write(mut self, out: &mut dyn WriteColor) -> std::io::Result<()> {
        for element in std::mem::take(&mut self.elements) {
            match element {
                Element::Entry(entry) => {
                    self.write_entry(out, &entry)?;
                }
                Element::Footer {
                    stats,
                    moves,
                    limit_info,
                } => {
                    write_footer(out, &stats, moves, &limit_info)?;
                }
            }
        }
        out.reset()
    }

    fn write_entry(&self, out: &mut dyn WriteColor, entry: &ClassifiedEntry) -> std::io::Result<()> {
        let marker = marker(entry);
        let parts = entry.word_diff.as_ref().or(entry.char_diff.as_ref());

        if entry.class == LineClass::Modified && self.modes.lines {
            if let Some(old) = entry.old_value.as_deref() {
                out.set_color(&COLORS.modified_old)?;
                writeln!(out, "{}{}", marker, old)?;
                out.reset()?;
            }
        }

        let color = get_line_color(entry.class);
        match parts {
            Some(parts) if entry.new_line.is_some() => {
                out.set_color(color)?;
                write!(out, "{}", marker)?;
                for part in parts {
                    match part.tag {
                        SubDiffTag::Equal => out.set_color(color)?,
                        SubDiffTag::Removed => out.set_color(&COLORS.part_removed)?,
                        SubDiffTag::Added => out.set_color(&COLORS.part_added)?,
                    }
                    write!(out, "{}", part.value)?;
                }
                out.reset()?;
                writeln!(out)?;
            }
            _ => {
                if color != &COLORS.default {
                    out.set_color(color)?;
                }
                write!(out, "{}{}", marker, entry.value)?;
                out.reset()?;
                writeln!(out)?;
            }
        }

        Ok(())
    }
}

fn write_footer(
    out: &mut dyn WriteColor,
    stats: &Stats,
    (block_moves, line_moves, cross_block): (usize, usize, usize),
    limit_info: &ComplexityDecision,
) -> std::io::Result<()> {
    out.set_color(&COLORS.footer)?;
    writeln!(
        out,
        "{} added, {} removed, {} modified, {} moved, {} unchanged",
        stats.added, stats.removed, stats.modified, stats.moved, stats.unchanged
    )?;
    out.reset()?;
    if block_moves + line_moves + cross_block > 0 {
        writeln!(
            out,
            "{} block moves, {} line moves, {} cross-block modifications",
            block_moves, line_moves, cross_block
        )?;
    }
    if limit_info.exceeded {
        writeln!(
            out,
            "complexity limit exceeded ({}){}",
            limit_info.reason,
            if limit_info.fast_mode { ", fast mode" } else { "" }
        )?;
    }
    Ok(())
}
