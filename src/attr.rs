// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Source name attribute codec.
//!
//! Every name in the source directory carries metadata about the target it
//! manages. The metadata is encoded as a chain of prefixes and suffixes
//! wrapped around the target name, e.g., `private_executable_dot_script.tmpl`
//! names a private executable template that produces `.script`.
//!
//! # Grammar
//!
//! Directories are decoded by stripping `exact_`, then `private_`, then one
//! name-shape prefix (`dot_` or `literal_`).
//!
//! Files are decoded in four stages:
//!
//! 1. An optional type prefix: `create_`, `modify_`, `run_`, or `symlink_`.
//! 2. The type's own ordered prefix rules, e.g., `once_` then `before_` or
//!    `after_` for scripts, or `encrypted_`, `private_`, `empty_`, then
//!    `executable_` for plain files.
//! 3. One name-shape prefix, `dot_` or `literal_`.
//! 4. The encrypted suffix when encrypted, then the `.tmpl` suffix, then the
//!    `.literal` suffix.
//!
//! Both directions are driven by the same ordered rule tables, so the encoder
//! can never drift from the decoder. Decoding never fails: any name decodes to
//! _some_ attribute record.
//!
//! # Pitfalls
//!
//! Encoding is the inverse of decoding for every attribute record, but not
//! the other way around. A hand-written name like `literal_foo` decodes to
//! `foo`, which encodes back to plain `foo`. The same goes for a needless
//! `.literal` suffix.
//!
//! Target names ending in something that looks like a suffix, e.g.,
//! `notes.tmpl`, are encoded with a trailing `.literal` so they are not
//! mistaken for templates.

/// Name-shape prefix that turns into a leading dot.
pub const DOT_PREFIX: &str = "dot_";

/// Name-shape prefix that escapes the rest of the name.
pub const LITERAL_PREFIX: &str = "literal_";

/// Suffix marking template files.
pub const TEMPLATE_SUFFIX: &str = ".tmpl";

/// Suffix that stops further suffixes from being stripped.
pub const LITERAL_SUFFIX: &str = ".literal";

const EXACT_PREFIX: &str = "exact_";
const PRIVATE_PREFIX: &str = "private_";

// Names starting with any of these must be escaped with `literal_`.
const DIR_LITERAL_PREFIXES: &[&str] = &["dot_", "exact_", "literal_", "private_"];
const FILE_LITERAL_PREFIXES: &[&str] = &[
    "after_",
    "before_",
    "create_",
    "dot_",
    "empty_",
    "encrypted_",
    "executable_",
    "literal_",
    "modify_",
    "once_",
    "private_",
    "run_",
    "symlink_",
];

/// Directory attributes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DirAttr {
    /// Name of the target directory.
    pub target_name: String,

    /// Remove anything in the target directory not in the source directory.
    pub exact: bool,

    /// Clear group and world permissions.
    pub private: bool,
}

impl DirAttr {
    /// Decode directory attributes from source name.
    pub fn parse(source_name: &str) -> Self {
        let mut name = source_name;
        let exact = strip(&mut name, EXACT_PREFIX);
        let private = strip(&mut name, PRIVATE_PREFIX);

        Self {
            target_name: decode_name_shape(name),
            exact,
            private,
        }
    }

    /// Encode directory attributes into a source name.
    pub fn source_name(&self) -> String {
        let mut name = String::new();
        if self.exact {
            name.push_str(EXACT_PREFIX);
        }
        if self.private {
            name.push_str(PRIVATE_PREFIX);
        }
        name.push_str(&encode_name_shape(&self.target_name, DIR_LITERAL_PREFIXES));
        name
    }

    /// Permission bits for directory before umask.
    pub fn perm(&self) -> u32 {
        let perm = 0o777;
        if self.private {
            perm & !0o077
        } else {
            perm
        }
    }
}

/// Kind of target a source file produces.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FileType {
    /// File written only if the target does not exist yet.
    Create,

    /// Regular file.
    #[default]
    File,

    /// Filter run over the current target contents.
    Modify,

    /// Script executed on apply.
    Script,

    /// Symbolic link.
    Symlink,
}

/// File attributes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileAttr {
    /// Name of the target file.
    pub target_name: String,

    /// Kind of target produced.
    pub file_type: FileType,

    /// Keep the target even if contents are empty.
    pub empty: bool,

    /// Source contents must be decrypted.
    pub encrypted: bool,

    /// Set executable permission bits.
    pub executable: bool,

    /// Run script at most once per content hash.
    pub once: bool,

    /// Script ordering, `-1` before regular entries, `1` after them.
    pub order: i8,

    /// Clear group and world permissions.
    pub private: bool,

    /// Source contents must be rendered as a template.
    pub template: bool,
}

#[derive(Clone, Copy, Debug)]
enum Flag {
    Empty,
    Encrypted,
    Executable,
    Once,
    Private,
}

#[derive(Clone, Copy, Debug)]
enum Rule {
    /// Prefix sets a boolean flag.
    Flag(&'static str, Flag),

    /// Prefix sets script order, only one order rule may apply.
    Order(&'static str, i8),
}

const TYPE_PREFIXES: &[(&str, FileType)] = &[
    ("create_", FileType::Create),
    ("modify_", FileType::Modify),
    ("run_", FileType::Script),
    ("symlink_", FileType::Symlink),
];

const CREATE_RULES: &[Rule] = &[
    Rule::Flag("encrypted_", Flag::Encrypted),
    Rule::Flag("private_", Flag::Private),
    Rule::Flag("executable_", Flag::Executable),
];

const FILE_RULES: &[Rule] = &[
    Rule::Flag("encrypted_", Flag::Encrypted),
    Rule::Flag("private_", Flag::Private),
    Rule::Flag("empty_", Flag::Empty),
    Rule::Flag("executable_", Flag::Executable),
];

const MODIFY_RULES: &[Rule] = &[
    Rule::Flag("encrypted_", Flag::Encrypted),
    Rule::Flag("private_", Flag::Private),
    Rule::Flag("executable_", Flag::Executable),
];

const SCRIPT_RULES: &[Rule] = &[
    Rule::Flag("once_", Flag::Once),
    Rule::Order("before_", -1),
    Rule::Order("after_", 1),
];

impl FileType {
    fn prefix(self) -> &'static str {
        TYPE_PREFIXES
            .iter()
            .find(|(_, file_type)| *file_type == self)
            .map(|(prefix, _)| *prefix)
            .unwrap_or_default()
    }

    fn rules(self) -> &'static [Rule] {
        match self {
            FileType::Create => CREATE_RULES,
            FileType::File => FILE_RULES,
            FileType::Modify => MODIFY_RULES,
            FileType::Script => SCRIPT_RULES,
            FileType::Symlink => &[],
        }
    }
}

impl FileAttr {
    /// Decode file attributes from source name.
    ///
    /// The encrypted suffix is only stripped from encrypted files.
    pub fn parse(source_name: &str, encrypted_suffix: &str) -> Self {
        let mut attr = FileAttr::default();
        let mut name = source_name;

        if let Some((prefix, file_type)) = TYPE_PREFIXES
            .iter()
            .find(|(prefix, _)| name.starts_with(prefix))
        {
            strip(&mut name, prefix);
            attr.file_type = *file_type;
        }

        for rule in attr.file_type.rules() {
            match *rule {
                Rule::Flag(prefix, flag) => {
                    if strip(&mut name, prefix) {
                        *attr.flag_mut(flag) = true;
                    }
                }
                Rule::Order(prefix, order) => {
                    if attr.order == 0 && strip(&mut name, prefix) {
                        attr.order = order;
                    }
                }
            }
        }

        let mut target_name = decode_name_shape(name);
        if attr.encrypted && !encrypted_suffix.is_empty() {
            if let Some(stripped) = target_name.strip_suffix(encrypted_suffix) {
                target_name = stripped.to_owned();
            }
        }
        if let Some(stripped) = target_name.strip_suffix(LITERAL_SUFFIX) {
            target_name = stripped.to_owned();
        } else if let Some(stripped) = target_name.strip_suffix(TEMPLATE_SUFFIX) {
            attr.template = true;
            target_name = stripped
                .strip_suffix(LITERAL_SUFFIX)
                .unwrap_or(stripped)
                .to_owned();
        }

        attr.target_name = target_name;
        attr
    }

    /// Encode file attributes into a source name.
    pub fn source_name(&self, encrypted_suffix: &str) -> String {
        let mut name = String::from(self.file_type.prefix());
        for rule in self.file_type.rules() {
            match *rule {
                Rule::Flag(prefix, flag) if self.flag(flag) => name.push_str(prefix),
                Rule::Order(prefix, order) if self.order == order => name.push_str(prefix),
                _ => {}
            }
        }

        name.push_str(&encode_name_shape(&self.target_name, FILE_LITERAL_PREFIXES));
        if needs_literal_suffix(&self.target_name, encrypted_suffix) {
            name.push_str(LITERAL_SUFFIX);
        }
        if self.template {
            name.push_str(TEMPLATE_SUFFIX);
        }
        if self.encrypted {
            name.push_str(encrypted_suffix);
        }
        name
    }

    /// Permission bits for file before umask.
    pub fn perm(&self) -> u32 {
        let mut perm = 0o666;
        if self.executable {
            perm |= 0o111;
        }
        if self.private {
            perm &= !0o077;
        }
        perm
    }

    fn flag(&self, flag: Flag) -> bool {
        match flag {
            Flag::Empty => self.empty,
            Flag::Encrypted => self.encrypted,
            Flag::Executable => self.executable,
            Flag::Once => self.once,
            Flag::Private => self.private,
        }
    }

    fn flag_mut(&mut self, flag: Flag) -> &mut bool {
        match flag {
            Flag::Empty => &mut self.empty,
            Flag::Encrypted => &mut self.encrypted,
            Flag::Executable => &mut self.executable,
            Flag::Once => &mut self.once,
            Flag::Private => &mut self.private,
        }
    }
}

fn strip(name: &mut &str, prefix: &str) -> bool {
    match name.strip_prefix(prefix) {
        Some(rest) => {
            *name = rest;
            true
        }
        None => false,
    }
}

fn decode_name_shape(name: &str) -> String {
    if let Some(rest) = name.strip_prefix(DOT_PREFIX) {
        format!(".{rest}")
    } else if let Some(rest) = name.strip_prefix(LITERAL_PREFIX) {
        rest.to_owned()
    } else {
        name.to_owned()
    }
}

fn needs_literal_suffix(target_name: &str, encrypted_suffix: &str) -> bool {
    target_name.ends_with(LITERAL_SUFFIX)
        || target_name.ends_with(TEMPLATE_SUFFIX)
        || (!encrypted_suffix.is_empty() && target_name.ends_with(encrypted_suffix))
}

fn encode_name_shape(target_name: &str, literal_prefixes: &[&str]) -> String {
    if let Some(rest) = target_name.strip_prefix('.') {
        format!("{DOT_PREFIX}{rest}")
    } else if literal_prefixes
        .iter()
        .any(|prefix| target_name.starts_with(prefix))
    {
        format!("{LITERAL_PREFIX}{target_name}")
    } else {
        target_name.to_owned()
    }
}
