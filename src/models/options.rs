/// Settings applied while compiling template source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompileOptions {
    /// Keep the whitespace around standalone tags instead of removing it.
    pub ignore_standalone: bool,
}

impl CompileOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ignore_standalone(mut self, ignore_standalone: bool) -> Self {
        self.ignore_standalone = ignore_standalone;
        self
    }
}

/// Settings applied while rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderOptions {
    /// Write `{{value}}` output without HTML escaping.
    pub no_escape: bool,
    /// Do not indent multi-line output of standalone partials.
    pub prevent_indent: bool,
}

impl RenderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn no_escape(mut self, no_escape: bool) -> Self {
        self.no_escape = no_escape;
        self
    }

    pub fn prevent_indent(mut self, prevent_indent: bool) -> Self {
        self.prevent_indent = prevent_indent;
        self
    }
}

/// Options a [`crate::Registry`] is created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UbarsOptions {
    pub compile: CompileOptions,
    pub render: RenderOptions,
}

impl UbarsOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ignore_standalone(mut self, ignore_standalone: bool) -> Self {
        self.compile.ignore_standalone = ignore_standalone;
        self
    }

    pub fn no_escape(mut self, no_escape: bool) -> Self {
        self.render.no_escape = no_escape;
        self
    }

    pub fn prevent_indent(mut self, prevent_indent: bool) -> Self {
        self.render.prevent_indent = prevent_indent;
        self
    }
}
