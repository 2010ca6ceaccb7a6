//! Table assembler.
//!
//! Builds every table of `tables_config`, in declared order: each source is
//! imported, transformed and merged into the table, which is then written
//! to the working store.

use crate::config::{InputOptions, ReportConfig, SourceConfig, TableConfig};
use crate::error::{AssemblyError, AssemblyResult};
use crate::logs::RunLog;
use crate::models::Frame;
use crate::parser::{import_source, SourceFormat};
use crate::settings;
use crate::store::RelationalStore;
use crate::transform::merge::outer_merge;
use crate::transform::operations::FrameOperation;
use crate::transform::reshape::{convert_datetime, pivot};

/// A table as written to the store.
#[derive(Debug, Clone)]
pub struct AssembledTable {
    pub name: String,
    pub frame: Frame,
    pub include_index: bool,
}

/// Whether a table keeps its row index, and the message explaining why.
///
/// The run default applies unless a source pivots (index kept); a source's
/// explicit `include_index` overrides both.
pub fn resolve_include_index(default: bool, table: &TableConfig) -> (bool, Option<&'static str>) {
    match table.explicit_include_index() {
        Some(true) => (true, Some(settings::MSG_INCLUDE_INDEX_TABLE_TRUE)),
        Some(false) => (false, Some(settings::MSG_INCLUDE_INDEX_TABLE_FALSE)),
        None if table.has_pivot() => (true, Some(settings::MSG_INCLUDE_INDEX_TABLE_PIVOT)),
        None => (default, None),
    }
}

/// Build and store every configured table.
pub fn assemble_tables(
    config: &ReportConfig,
    store: &mut dyn RelationalStore,
    log: &mut RunLog,
) -> AssemblyResult<Vec<AssembledTable>> {
    let default_index = config.input.include_index;
    log.info(
        if default_index {
            settings::MSG_INCLUDE_INDEX_ALL_TRUE
        } else {
            settings::MSG_INCLUDE_INDEX_ALL_FALSE
        },
        2,
        0,
    );
    for op in FrameOperation::from_input(&config.input) {
        log.info(op.message(), 1, 0);
    }

    let mut assembled = Vec::with_capacity(config.tables.len());
    for table in &config.tables {
        log.info_with_data(settings::MSG_CREATING_TABLE, &table.name, 2, 0);

        let (include_index, reason) = resolve_include_index(default_index, table);
        if let Some(reason) = reason {
            log.info_with_data(reason, &table.name, 2, 1);
        }

        let frame = build_table(table, &config.input, log)?;
        if include_index {
            let index_name = frame
                .index
                .as_ref()
                .map_or(settings::DEFAULT_INDEX_NAME, |index| index.name.as_str());
            if frame.column_position(index_name).is_some() {
                return Err(AssemblyError::IndexColumnConflict {
                    table: table.name.clone(),
                    column: index_name.to_string(),
                });
            }
        }
        store
            .create_or_replace_table(&table.name, &frame, include_index)
            .map_err(|source| AssemblyError::Store {
                table: table.name.clone(),
                source,
            })?;
        log.info_with_data(settings::MSG_CREATED_TABLE, &table.name, 0, 0);

        assembled.push(AssembledTable {
            name: table.name.clone(),
            frame,
            include_index,
        });
    }
    Ok(assembled)
}

/// Import, transform and merge the sources of one table.
pub fn build_table(table: &TableConfig, input: &InputOptions, log: &mut RunLog) -> AssemblyResult<Frame> {
    let mut merged: Option<Frame> = None;
    for source in &table.sources {
        let frame = load_source(&table.name, source, input, log)?;
        merged = Some(match merged {
            None => frame,
            Some(acc) => {
                log.info_with_data(settings::MSG_MERGING_PATH, source.path.display(), 2, 1);
                outer_merge(&acc, &frame, &table.name, &source.path)?
            }
        });
    }
    Ok(merged.unwrap_or_default())
}

/// Read one source and apply the input options, then its pivot and
/// datetime conversions.
fn load_source(table: &str, source: &SourceConfig, input: &InputOptions, log: &mut RunLog) -> AssemblyResult<Frame> {
    let path = &source.path;
    log.info_with_data(settings::MSG_IMPORTING_DATA, path.display(), 2, 1);

    let format = SourceFormat::from_path(path).ok_or_else(|| AssemblyError::BadFileExtension { path: path.clone() })?;
    let mut frame = import_source(path, format, source.sheet.as_ref(), log)
        .map_err(|source| AssemblyError::Import {
            table: table.to_string(),
            source,
        })?
        .frame;

    for op in FrameOperation::from_input(input) {
        op.apply(&mut frame);
    }

    if let Some(spec) = &source.pivot {
        log.info_with_data(settings::MSG_APPLYING_PIVOT, path.display(), 1, 1);
        frame = pivot(&frame, spec, path)?;
    }

    if !source.datetime.is_empty() {
        log.info(settings::MSG_CONVERTING_DATETIME, 2, 1);
        for column in &source.datetime {
            log.info_with_data(
                &column.column,
                column.format.as_deref().unwrap_or("(default format)"),
                2,
                2,
            );
            convert_datetime(&mut frame, column, path)?;
        }
    }

    Ok(frame)
}
