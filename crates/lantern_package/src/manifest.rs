//! Package manifest analysis and templated generation.
//!
//! A manifest is an XML document whose root element carries the
//! `EntryPointAssembly`/`EntryPointType` attribute pair and whose descendants
//! declare the bundled parts through `Name`/`Source` attribute pairs.

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PackageError, PackageResult};
use crate::resources::{ASSEMBLY_PARTS_PLACEHOLDER, MANIFEST_TEMPLATE};

/// One part declared in a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartDescriptor {
    /// Assembly name (file name without extension)
    pub name: String,
    /// File name inside the package
    pub source_file_name: String,
}

impl PartDescriptor {
    pub fn new(name: impl Into<String>, source_file_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_file_name: source_file_name.into(),
        }
    }
}

/// What a manifest says about its package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestAnalysis {
    pub entry_assembly_name: Option<String>,
    /// Source file of the part whose name matches the entry assembly.
    pub entry_assembly_file_name: Option<String>,
    pub entry_type_name: Option<String>,
    pub parts: Vec<PartDescriptor>,
}

/// Parse manifest content.
pub fn analyze(content: &str) -> PackageResult<ManifestAnalysis> {
    if content.trim().is_empty() {
        return Err(PackageError::InvalidManifest("empty manifest".to_string()));
    }

    let mut reader = Reader::from_str(content);
    reader.trim_text(true);

    let mut analysis = ManifestAnalysis::default();
    let mut depth = 0usize;
    let mut seen_root = false;

    loop {
        match reader.read_event()? {
            Event::Start(element) => {
                visit_element(&element, depth == 0, &mut analysis)?;
                seen_root = true;
                depth += 1;
            }
            Event::Empty(element) => {
                visit_element(&element, depth == 0, &mut analysis)?;
                seen_root = true;
            }
            Event::End(_) => depth = depth.saturating_sub(1),
            Event::Eof => break,
            _ => {}
        }
    }

    if !seen_root {
        return Err(PackageError::InvalidManifest(
            "manifest does not have a root element".to_string(),
        ));
    }

    if let Some(entry) = &analysis.entry_assembly_name {
        analysis.entry_assembly_file_name = analysis
            .parts
            .iter()
            .find(|p| &p.name == entry)
            .map(|p| p.source_file_name.clone());
    }

    debug!(
        "Analyzed manifest: entry point {:?}, {} parts",
        analysis.entry_assembly_name,
        analysis.parts.len()
    );

    Ok(analysis)
}

fn visit_element(
    element: &BytesStart<'_>,
    is_root: bool,
    analysis: &mut ManifestAnalysis,
) -> PackageResult<()> {
    let mut name = None;
    let mut source = None;

    for attr in element.attributes() {
        let attr = attr.map_err(|e| PackageError::InvalidManifest(e.to_string()))?;
        let value = attr.unescape_value()?.into_owned();
        match attr.key.local_name().as_ref() {
            b"EntryPointAssembly" if is_root => analysis.entry_assembly_name = Some(value),
            b"EntryPointType" if is_root => analysis.entry_type_name = Some(value),
            b"Name" => name = Some(value),
            b"Source" => source = Some(value),
            _ => {}
        }
    }

    if is_root {
        return Ok(());
    }

    if let (Some(name), Some(source)) = (name, source) {
        if !name.is_empty() && !source.is_empty() {
            analysis.parts.push(PartDescriptor::new(name, source));
        }
    }

    Ok(())
}

/// Generates a manifest by expanding the parts placeholder of a template.
#[derive(Debug, Clone)]
pub struct ManifestGenerator {
    template: String,
    parts: Vec<PartDescriptor>,
}

impl Default for ManifestGenerator {
    fn default() -> Self {
        Self::new(MANIFEST_TEMPLATE)
    }
}

impl ManifestGenerator {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            parts: Vec::new(),
        }
    }

    /// Register a part. Returns `false` when a part with the same source
    /// (case-insensitive) is already registered.
    pub fn add_part(&mut self, part: PartDescriptor) -> bool {
        if self
            .parts
            .iter()
            .any(|p| p.source_file_name.eq_ignore_ascii_case(&part.source_file_name))
        {
            return false;
        }
        self.parts.push(part);
        true
    }

    pub fn parts(&self) -> &[PartDescriptor] {
        &self.parts
    }

    /// Render the manifest.
    pub fn generate(&self) -> String {
        let parts: String = self
            .parts
            .iter()
            .map(|p| {
                format!(
                    "    <AssemblyPart x:Name=\"{}\" Source=\"{}\" />\n",
                    escape(p.name.as_str()),
                    escape(p.source_file_name.as_str())
                )
            })
            .collect();

        self.template.replace(ASSEMBLY_PARTS_PLACEHOLDER, &parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE_MANIFEST: &str = r#"<Deployment xmlns="http://schemas.microsoft.com/client/2007/deployment" xmlns:x="http://schemas.microsoft.com/winfx/2006/xaml" EntryPointAssembly="Shop.Tests" EntryPointType="Shop.Tests.App" RuntimeVersion="4.0.50826.0">
  <Deployment.Parts>
    <AssemblyPart x:Name="Shop.Tests" Source="Shop.Tests.dll" />
    <AssemblyPart x:Name="Shop.Core" Source="Shop.Core.dll" />
    <AssemblyPart x:Name="" Source="Broken.dll" />
  </Deployment.Parts>
</Deployment>"#;

    #[test]
    fn test_analyze_entry_point_and_parts() {
        let analysis = analyze(SOURCE_MANIFEST).unwrap();

        assert_eq!(analysis.entry_assembly_name.as_deref(), Some("Shop.Tests"));
        assert_eq!(analysis.entry_type_name.as_deref(), Some("Shop.Tests.App"));
        assert_eq!(
            analysis.entry_assembly_file_name.as_deref(),
            Some("Shop.Tests.dll")
        );
        assert_eq!(
            analysis.parts,
            vec![
                PartDescriptor::new("Shop.Tests", "Shop.Tests.dll"),
                PartDescriptor::new("Shop.Core", "Shop.Core.dll"),
            ]
        );
    }

    #[test]
    fn test_analyze_rejects_empty_content() {
        assert!(matches!(
            analyze("   "),
            Err(PackageError::InvalidManifest(_))
        ));
    }

    #[test]
    fn test_analyze_rejects_malformed_xml() {
        assert!(analyze("<Deployment><Parts></Deployment>").is_err());
    }

    #[test]
    fn test_generator_dedups_by_source_case_insensitive() {
        let mut generator = ManifestGenerator::default();
        assert!(generator.add_part(PartDescriptor::new("A", "A.dll")));
        assert!(!generator.add_part(PartDescriptor::new("a", "a.DLL")));
        assert!(generator.add_part(PartDescriptor::new("B", "B.dll")));

        let manifest = generator.generate();
        assert!(!manifest.contains(ASSEMBLY_PARTS_PLACEHOLDER));
        let a = manifest.find("Source=\"A.dll\"").unwrap();
        let b = manifest.find("Source=\"B.dll\"").unwrap();
        assert!(a < b);
        assert_eq!(manifest.matches("A.dll").count(), 1);
    }

    #[test]
    fn test_generated_manifest_round_trips() {
        let template = r#"<Deployment xmlns:x="http://schemas.microsoft.com/winfx/2006/xaml" EntryPointAssembly="Runner" EntryPointType="Runner.App">
  <Deployment.Parts>
{ADDITIONAL_ASSEMBLY_PARTS}  </Deployment.Parts>
</Deployment>"#;
        let mut generator = ManifestGenerator::new(template);
        generator.add_part(PartDescriptor::new("Runner", "Runner.dll"));
        generator.add_part(PartDescriptor::new("Odd & Name", "Odd & Name.dll"));
        generator.add_part(PartDescriptor::new("Lib", "Lib.dll"));

        let analysis = analyze(&generator.generate()).unwrap();

        assert_eq!(analysis.entry_assembly_name.as_deref(), Some("Runner"));
        assert_eq!(analysis.entry_type_name.as_deref(), Some("Runner.App"));
        assert_eq!(analysis.entry_assembly_file_name.as_deref(), Some("Runner.dll"));

        let mut expected = generator.parts().to_vec();
        let mut actual = analysis.parts;
        expected.sort_by(|a, b| a.name.cmp(&b.name));
        actual.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_default_template_declares_runtime_parts() {
        let analysis = analyze(&ManifestGenerator::default().generate()).unwrap();
        assert_eq!(analysis.entry_assembly_name.as_deref(), Some("Lantern.Harness"));
        assert_eq!(
            analysis.entry_assembly_file_name.as_deref(),
            Some("Lantern.Harness.dll")
        );
        assert_eq!(analysis.parts.len(), 3);
    }
}
