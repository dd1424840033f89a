// sonic -- a Sonic to C++ translator for digital audio processing
// Copyright (C) 2021  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Expansion of wave assignments, the distinctive Sonic construct.
//!
//! `W[c,i] <op> rvalue;` becomes a block that opens every involved wave,
//! runs a sample loop whose bound comes from an explicit limit, the
//! l-value's own length, or a countdown fed by the r-value's wave reads,
//! fills one sample frame per iteration (one line per channel), and
//! closes everything again.

use std::io::Write;

use crate::ast::{Expr, ExprKind, Lvalue, LvalueTarget, WaveRefs};
use crate::error::{Result, TranslationError};
use crate::token::Token;

use super::{CodeGen, LOCAL_PREFIX};

impl<'a> CodeGen<'a> {
    pub(super) fn gen_wave_assignment(
        &mut self,
        o: &mut dyn Write,
        op: &Token,
        lvalue: &Lvalue,
        rvalue: &Expr,
    ) -> Result<()> {
        let limit = match &lvalue.target {
            LvalueTarget::Wave { limit } => limit.as_ref(),
            _ => {
                return Err(TranslationError::internal(
                    "wave assignment with a non-wave l-value",
                    Some(&lvalue.name),
                ))
            }
        };
        let lname = lvalue.name.lexeme();

        self.indent(o, "{\n")?;
        self.push_indent();

        // A comment restating the original statement explains the
        // machinery that follows.
        self.generating_comment = true;
        self.indent(o, "//  ")?;
        write!(o, "{}[c,i", lname)?;
        if let Some(limit) = limit {
            write!(o, ":")?;
            self.gen_expr(o, limit)?;
        }
        write!(o, "] {} ", op)?;
        self.gen_expr(o, rvalue)?;
        writeln!(o, ";")?;
        writeln!(o)?;
        self.generating_comment = false;

        // Every wave the r-value reads, and whether '$' forces a
        // read-modify-write pass over the l-value.
        let mut refs = WaveRefs::default();
        refs.add_name(&lvalue.name);
        rvalue.collect_wave_refs(&mut refs);
        let mut modify = refs.modifies;

        self.indent(o, LOCAL_PREFIX)?;
        write!(o, "{}", lname)?;
        if *op == "=" && !modify {
            writeln!(o, ".open_for_write();")?;
        } else if *op == "<<" {
            if modify {
                return Err(TranslationError::semantic(
                    "cannot use append operator when '$' appears on right side",
                    op,
                ));
            }
            writeln!(o, ".open_for_append();")?;
        } else {
            writeln!(o, ".open_for_modify();")?;
            modify = true;
        }

        for name in refs.names.iter().skip(1) {
            self.indent(o, LOCAL_PREFIX)?;
            writeln!(o, "{}.open_for_read();", name)?;
        }

        self.indent(o, "double sample [NumChannels];\n")?;
        self.indent(o, "double t = double(0);\n")?;

        let mut implicit_self_num_samples = false;
        if let Some(limit) = limit {
            self.indent(o, "const long numSamples = long(")?;
            // Inside the limit a bare 'n' means the l-value's own length.
            self.bracketer = Some(lname.to_string());
            let limit_result = self.gen_expr(o, limit);
            self.bracketer = None;
            limit_result?;
            writeln!(o, ");")?;
        } else if refs.occurrences == 0 && modify {
            self.indent(o, "const long numSamples = ")?;
            writeln!(o, "{}{}.query_num_samples();", LOCAL_PREFIX, lname)?;
            implicit_self_num_samples = true;
        }

        let rvalue_is_vector = matches!(rvalue.kind, ExprKind::Vector { .. });
        self.inside_vector = rvalue_is_vector;
        let pre_sample = self.gen_pre_sample(o, rvalue);
        self.inside_vector = false;
        pre_sample?;

        if limit.is_some() || implicit_self_num_samples {
            self.indent(o, "for ( long i=0; i < numSamples; ++i, t += SampleTime )\n")?;
        } else {
            if refs.occurrences == 0 {
                return Err(TranslationError::semantic(
                    "cannot determine number of samples to generate",
                    &rvalue.first,
                ));
            }
            self.indent(o, "for ( long i=0; ; ++i, t += SampleTime )\n")?;
        }

        self.indent(o, "{\n")?;
        self.push_indent();

        if refs.occurrences > 0 {
            if limit.is_none() {
                self.indent(o, "int countdown = NumChannels")?;
                if refs.occurrences > 1 {
                    write!(o, " * {}", refs.occurrences)?;
                }
                writeln!(o, ";")?;
            } else {
                self.indent(o, "int countdown;\n")?;
            }
        }

        if modify {
            self.indent(o, LOCAL_PREFIX)?;
            writeln!(o, "{}.read ( sample );", lname)?;
        }

        let assign_op = if *op == "<<" { "=" } else { op.lexeme() };

        self.inside_vector = rvalue_is_vector;
        let pre_channel = self.gen_pre_channel(o, rvalue);
        self.inside_vector = false;
        pre_channel?;

        // One assignment line per channel. The builtin 'c' becomes the
        // literal channel index, so each line is that channel's formula.
        if let ExprKind::Vector { components } = &rvalue.kind {
            self.i_allowed = true;
            self.c_allowed = true;
            self.inside_vector = true;
            for (channel, component) in components.iter().enumerate() {
                self.channel_value = Some(channel);
                self.indent(o, "sample[")?;
                write!(o, "{}] {} ", channel, assign_op)?;
                self.gen_expr(o, component)?;
                writeln!(o, ";")?;
            }
            self.i_allowed = false;
            self.c_allowed = false;
            self.inside_vector = false;
            self.channel_value = None;
        } else {
            let num_channels = self.program.num_channels as usize;
            self.i_allowed = true;
            self.c_allowed = true;
            for channel in 0..num_channels {
                self.channel_value = Some(channel);
                self.indent(o, "sample[")?;
                write!(o, "{}] {} ", channel, assign_op)?;
                self.gen_expr(o, rvalue)?;
                writeln!(o, ";")?;
            }
            self.i_allowed = false;
            self.c_allowed = false;
            self.channel_value = None;
        }

        if limit.is_none() && !implicit_self_num_samples && refs.occurrences > 0 {
            self.indent(o, "if ( countdown <= 0 ) break;\n")?;
        }

        self.indent(o, LOCAL_PREFIX)?;
        writeln!(o, "{}.write ( sample );", lname)?;
        self.pop_indent();
        self.indent(o, "}\n")?;

        for name in &refs.names {
            self.indent(o, LOCAL_PREFIX)?;
            writeln!(o, "{}.close();", name)?;
        }

        self.pop_indent();
        self.indent(o, "}\n")?;

        // Import objects get a fresh 'reset' in the next wave assignment.
        match self.func {
            Some(func) => func.clear_reset_flags(),
            None => {
                return Err(TranslationError::internal(
                    "wave assignment emitted outside a function context",
                    Some(&lvalue.name),
                ))
            }
        }
        self.program.clear_reset_flags();
        Ok(())
    }
}
