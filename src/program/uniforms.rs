//! Uniform block layout and values.
//!
//! Every field is a `vec4<f32>` so the WGSL struct and the host buffer agree
//! on layout without any padding rules.

use bytemuck::{Pod, Zeroable};

/// Ordered field names of the `KernelUniforms` struct.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UniformLayout {
    fields: Vec<String>,
}

impl UniformLayout {
    pub fn push(&mut self, name: impl Into<String>) {
        self.fields.push(name.into());
    }

    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field == name)
    }

    #[must_use]
    pub fn byte_size(&self) -> u64 {
        (self.fields.len().max(1) * size_of::<Slot>()) as u64
    }

    /// WGSL declaration of the struct and its binding.
    #[must_use]
    pub fn wgsl(&self) -> String {
        let mut text = String::from("struct KernelUniforms {\n");
        if self.fields.is_empty() {
            text.push_str("    unused: vec4<f32>,\n");
        }
        for field in &self.fields {
            text.push_str(&format!("    {field}: vec4<f32>,\n"));
        }
        text.push_str("};\n\n@group(0) @binding(0) var<uniform> kernel_uniforms: KernelUniforms;\n");
        text
    }

    /// A zeroed block matching this layout.
    #[must_use]
    pub fn block(&self) -> UniformBlock {
        UniformBlock {
            fields: self.fields.clone(),
            values: vec![Slot::zeroed(); self.fields.len().max(1)],
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
struct Slot([f32; 4]);

/// Uniform values for one draw.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformBlock {
    fields: Vec<String>,
    values: Vec<Slot>,
}

impl UniformBlock {
    /// Writes `value` into field `name`.
    ///
    /// Returns `false` when the layout has no such field, which is the case
    /// for shapes baked into the program.
    pub fn set(&mut self, name: &str, value: [f32; 4]) -> bool {
        match self.fields.iter().position(|field| field == name) {
            Some(index) => {
                self.values[index] = Slot(value);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<[f32; 4]> {
        let index = self.fields.iter().position(|field| field == name)?;
        Some(self.values[index].0)
    }

    /// Raw bytes for the uniform buffer.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_follows_layout_order() {
        let mut layout = UniformLayout::default();
        layout.push("output_dim");
        layout.push("user_a");

        let mut block = layout.block();
        assert!(block.set("user_a", [2.5, 0.0, 0.0, 0.0]));
        assert!(!block.set("user_b_dim", [1.0; 4]));

        assert_eq!(block.as_bytes().len(), 32);
        assert_eq!(&block.as_bytes()[16..20], &2.5f32.to_ne_bytes());
        assert_eq!(block.get("output_dim"), Some([0.0; 4]));
        assert_eq!(layout.byte_size(), 32);
    }

    #[test]
    fn wgsl_lists_every_field() {
        let mut layout = UniformLayout::default();
        layout.push("output_dim");
        layout.push("tex_size");
        let text = layout.wgsl();
        assert!(text.contains("    output_dim: vec4<f32>,\n    tex_size: vec4<f32>,"));
        assert!(text.contains("@group(0) @binding(0) var<uniform> kernel_uniforms"));
    }
}
