//! Terminal rendering of markdown answers with colors and styling

use crate::error::Result;
use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use std::io::Write;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Print markdown to stdout, colored when the terminal supports it
pub fn format_markdown(markdown: &str) -> Result<()> {
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);
    render(&mut stdout, markdown)?;
    stdout.reset()?;
    Ok(())
}

/// Render markdown into any color-capable writer
pub fn render<W: WriteColor>(out: &mut W, markdown: &str) -> Result<()> {
    let mut state = FormatState::default();
    for event in Parser::new_ext(markdown, Options::all()) {
        state.handle_event(out, event)?;
    }
    Ok(())
}

#[derive(Default)]
struct FormatState {
    format_stack: Vec<ColorSpec>,
    /// Next number of each open list, `None` for bullet lists
    lists: Vec<Option<u64>>,
}

impl FormatState {
    fn handle_event<W: WriteColor>(&mut self, out: &mut W, event: Event<'_>) -> Result<()> {
        match event {
            Event::Start(tag) => self.handle_start(out, tag),
            Event::End(tag_end) => self.handle_end(out, tag_end),
            Event::Text(text) => Ok(write!(out, "{}", text)?),
            Event::Code(code) => self.write_inline_code(out, &code),
            Event::SoftBreak | Event::HardBreak => Ok(writeln!(out)?),
            Event::Rule => Ok(writeln!(out, "{}", "─".repeat(40))?),
            _ => Ok(()),
        }
    }

    fn push_spec<W: WriteColor>(&mut self, out: &mut W, spec: ColorSpec) -> Result<()> {
        out.set_color(&spec)?;
        self.format_stack.push(spec);
        Ok(())
    }

    fn pop_spec<W: WriteColor>(&mut self, out: &mut W) -> Result<()> {
        self.format_stack.pop();
        match self.format_stack.last() {
            Some(spec) => out.set_color(spec)?,
            None => out.reset()?,
        }
        Ok(())
    }

    fn handle_start<W: WriteColor>(&mut self, out: &mut W, tag: Tag<'_>) -> Result<()> {
        match tag {
            Tag::Heading { level, .. } => {
                let color = match level {
                    HeadingLevel::H1 => Color::Rgb(255, 99, 71),
                    HeadingLevel::H2 => Color::Rgb(70, 130, 180),
                    _ => Color::Cyan,
                };
                let mut spec = ColorSpec::new();
                spec.set_fg(Some(color)).set_bold(true);
                self.push_spec(out, spec)?;
                if level == HeadingLevel::H1 {
                    writeln!(out)?;
                }
            }
            Tag::Paragraph if self.lists.is_empty() => writeln!(out)?,
            Tag::Strong => {
                let mut spec = ColorSpec::new();
                spec.set_bold(true);
                self.push_spec(out, spec)?;
            }
            Tag::Emphasis => {
                let mut spec = ColorSpec::new();
                spec.set_italic(true);
                self.push_spec(out, spec)?;
            }
            Tag::BlockQuote(_) => {
                let mut spec = ColorSpec::new();
                spec.set_fg(Some(Color::Yellow));
                self.push_spec(out, spec)?;
                write!(out, "  │ ")?;
            }
            Tag::CodeBlock(kind) => {
                let mut spec = ColorSpec::new();
                spec.set_fg(Some(Color::Green));
                writeln!(out)?;
                if let CodeBlockKind::Fenced(lang) = kind {
                    if !lang.is_empty() {
                        let mut lang_spec = ColorSpec::new();
                        lang_spec.set_fg(Some(Color::Blue)).set_italic(true);
                        out.set_color(&lang_spec)?;
                        writeln!(out, "[{}]", lang)?;
                    }
                }
                self.push_spec(out, spec)?;
            }
            Tag::List(start) => {
                if self.lists.is_empty() {
                    writeln!(out)?;
                }
                self.lists.push(start);
            }
            Tag::Item => {
                let indent = "  ".repeat(self.lists.len().saturating_sub(1));
                match self.lists.last_mut() {
                    Some(Some(number)) => {
                        write!(out, "{}{}. ", indent, number)?;
                        *number += 1;
                    }
                    _ => write!(out, "{}• ", indent)?,
                }
            }
            Tag::Link { .. } => {
                let mut spec = ColorSpec::new();
                spec.set_fg(Some(Color::Blue)).set_underline(true);
                self.push_spec(out, spec)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn handle_end<W: WriteColor>(&mut self, out: &mut W, tag_end: TagEnd) -> Result<()> {
        match tag_end {
            TagEnd::Heading(_) => {
                self.pop_spec(out)?;
                writeln!(out)?;
            }
            TagEnd::Paragraph if self.lists.is_empty() => writeln!(out)?,
            TagEnd::Strong | TagEnd::Emphasis | TagEnd::Link => self.pop_spec(out)?,
            TagEnd::BlockQuote(_) | TagEnd::CodeBlock => {
                self.pop_spec(out)?;
                writeln!(out)?;
            }
            TagEnd::List(_) => {
                self.lists.pop();
            }
            TagEnd::Item => writeln!(out)?,
            _ => {}
        }
        Ok(())
    }

    fn write_inline_code<W: WriteColor>(&self, out: &mut W, code: &str) -> Result<()> {
        out.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
        write!(out, "`{}`", code)?;
        match self.format_stack.last() {
            Some(spec) => out.set_color(spec)?,
            None => out.reset()?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use termcolor::Buffer;

    fn plain(markdown: &str) -> String {
        let mut buffer = Buffer::no_color();
        render(&mut buffer, markdown).unwrap();
        String::from_utf8(buffer.into_inner()).unwrap()
    }

    #[test]
    fn test_lists_are_numbered_and_bulleted() {
        let text = plain("Steps:\n\n1. Oil the spindle\n2. Clean the bed\n\n- daily\n- weekly\n");
        assert!(text.contains("1. Oil the spindle\n2. Clean the bed\n"));
        assert!(text.contains("• daily\n• weekly\n"));
    }

    #[test]
    fn test_inline_styles_keep_text() {
        let text = plain("Doors open at **9am** with `badge` and [map](https://a.org/map)");
        assert_eq!(text.trim(), "Doors open at 9am with `badge` and map");
    }

    #[test]
    fn test_colored_output_has_escapes() {
        let mut buffer = Buffer::ansi();
        render(&mut buffer, "# Tickets").unwrap();
        let text = String::from_utf8(buffer.into_inner()).unwrap();
        assert!(text.contains("\x1b["));
        assert!(text.contains("Tickets"));
    }
}
