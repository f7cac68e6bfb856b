//! Shared statistics and downcasting primitives for converters.

use std::collections::HashSet;

use crate::types::Column;

/// Iterate the non-null values of a nullable string slice.
pub(crate) fn valid_values(values: &[Option<String>]) -> impl Iterator<Item = &str> {
    values.iter().filter_map(|v| v.as_deref())
}

/// Proportion of non-null values satisfying `pred`. Zero when there are no
/// non-null values (no evidence is treated as no match).
pub(crate) fn proportion_matching<F>(values: &[Option<String>], pred: F) -> f64
where
    F: Fn(&str) -> bool,
{
    let mut valid = 0usize;
    let mut matching = 0usize;
    for v in valid_values(values) {
        valid += 1;
        if pred(v) {
            matching += 1;
        }
    }
    if valid == 0 {
        return 0.0;
    }
    matching as f64 / valid as f64
}

/// Proportion of non-null values that are unique.
pub(crate) fn proportion_unique(values: &[Option<String>]) -> f64 {
    let mut valid = 0usize;
    let mut seen = HashSet::new();
    for v in valid_values(values) {
        valid += 1;
        seen.insert(v);
    }
    if valid == 0 {
        return 0.0;
    }
    seen.len() as f64 / valid as f64
}

/// Minimum and maximum over non-null values.
pub(crate) fn min_max<T: PartialOrd + Copy>(values: &[Option<T>]) -> Option<(T, T)> {
    let mut result: Option<(T, T)> = None;
    for v in values.iter().flatten() {
        result = Some(match result {
            None => (*v, *v),
            Some((lo, hi)) => (
                if *v < lo { *v } else { lo },
                if *v > hi { *v } else { hi },
            ),
        });
    }
    result
}

/// Narrow signed 64-bit values to the smallest sufficient integer column.
///
/// Non-negative ranges narrow to unsigned widths; otherwise signed widths
/// are tried. Ranges that fit nothing smaller stay 64-bit.
pub(crate) fn downcast_signed(values: Vec<Option<i64>>) -> Column {
    let Some((vmin, vmax)) = min_max(&values) else {
        return Column::Int64(values);
    };

    if vmin >= 0 {
        if vmax <= u8::MAX as i64 {
            return Column::UInt8(values.iter().map(|v| v.map(|v| v as u8)).collect());
        }
        if vmax <= u16::MAX as i64 {
            return Column::UInt16(values.iter().map(|v| v.map(|v| v as u16)).collect());
        }
        if vmax <= u32::MAX as i64 {
            return Column::UInt32(values.iter().map(|v| v.map(|v| v as u32)).collect());
        }
    } else {
        if vmin >= i8::MIN as i64 && vmax <= i8::MAX as i64 {
            return Column::Int8(values.iter().map(|v| v.map(|v| v as i8)).collect());
        }
        if vmin >= i16::MIN as i64 && vmax <= i16::MAX as i64 {
            return Column::Int16(values.iter().map(|v| v.map(|v| v as i16)).collect());
        }
        if vmin >= i32::MIN as i64 && vmax <= i32::MAX as i64 {
            return Column::Int32(values.iter().map(|v| v.map(|v| v as i32)).collect());
        }
    }

    Column::Int64(values)
}

/// Narrow unsigned 64-bit values to the smallest sufficient unsigned column.
pub(crate) fn downcast_unsigned(values: Vec<Option<u64>>) -> Column {
    let Some((_, vmax)) = min_max(&values) else {
        return Column::UInt64(values);
    };

    if vmax <= u8::MAX as u64 {
        return Column::UInt8(values.iter().map(|v| v.map(|v| v as u8)).collect());
    }
    if vmax <= u16::MAX as u64 {
        return Column::UInt16(values.iter().map(|v| v.map(|v| v as u16)).collect());
    }
    if vmax <= u32::MAX as u64 {
        return Column::UInt32(values.iter().map(|v| v.map(|v| v as u32)).collect());
    }

    Column::UInt64(values)
}

/// Widen any integer column back to nullable i64 values, if it is one.
pub(crate) fn integers_as_i64(column: &Column) -> Option<Vec<Option<i64>>> {
    fn widen<T: Copy + Into<i64>>(values: &[Option<T>]) -> Vec<Option<i64>> {
        values.iter().map(|v| v.map(Into::into)).collect()
    }

    match column {
        Column::Int8(v) => Some(widen(v)),
        Column::Int16(v) => Some(widen(v)),
        Column::Int32(v) => Some(widen(v)),
        Column::Int64(v) => Some(v.clone()),
        Column::UInt8(v) => Some(widen(v)),
        Column::UInt16(v) => Some(widen(v)),
        Column::UInt32(v) => Some(widen(v)),
        Column::UInt64(v) => {
            // Only representable when every value fits.
            let mut out = Vec::with_capacity(v.len());
            for value in v {
                match value {
                    None => out.push(None),
                    Some(value) => {
                        if *value > i64::MAX as u64 {
                            return None;
                        }
                        out.push(Some(*value as i64));
                    }
                }
            }
            Some(out)
        }
        _ => None,
    }
}
