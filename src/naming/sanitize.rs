//! Identifier Sanitization
//!
//! The execution backend follows Kubernetes naming conventions for step
//! names, which differ from the identifiers the workflow compiler emits.

/// Converts a step name into the target platform's identifier alphabet.
///
/// Underscores become hyphens, characters are lowercased and all
/// whitespace is removed. The function is total and idempotent.
///
/// # Example
///
/// ```
/// use cwl2compute::naming::sanitize;
///
/// assert_eq!(sanitize("My_Step Name"), "my-step-name");
/// assert_eq!(sanitize("FileRenaming"), "filerenaming");
/// ```
pub fn sanitize(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == '_' { '-' } else { c })
        .flat_map(char::to_lowercase)
        .collect()
}

/// Characters treated as word breaks when deriving a plugin class name.
const CLASS_NAME_BREAKS: &[char] = &['(', ')', '<', '>', '-', '_'];

/// Derives the class-style name the plugin registry uses for a manifest name.
///
/// Word breaks are removed, each word is title-cased and `/` becomes `_`.
///
/// # Example
///
/// ```
/// use cwl2compute::naming::class_name;
///
/// assert_eq!(class_name("File Renaming"), "FileRenaming");
/// assert_eq!(class_name("OME Converter (v2)"), "OmeConverterV2");
/// ```
pub fn class_name(name: &str) -> String {
    let mut result = String::with_capacity(name.len());
    let mut previous_cased = false;

    for ch in name.chars() {
        if CLASS_NAME_BREAKS.contains(&ch) || ch == ' ' {
            previous_cased = false;
            continue;
        }

        if ch == '/' {
            result.push('_');
            previous_cased = false;
            continue;
        }

        if ch.is_alphabetic() {
            if previous_cased {
                result.extend(ch.to_lowercase());
            } else {
                result.extend(ch.to_uppercase());
            }
            previous_cased = true;
        } else {
            result.push(ch);
            previous_cased = false;
        }
    }

    result
}
