use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{bail, Result};
use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;

use crate::models::{Dependencies, Import, Module, ModuleType, Package, PackageId};

/// Analyzer for Maven projects: direct dependencies declared in `pom.xml`.
pub struct MavenAnalyzer {
    root: PathBuf,
}

impl MavenAnalyzer {
    pub fn new(module: &Module) -> Result<Self> {
        Ok(Self {
            root: super::existing_dir(module)?,
        })
    }
}

#[async_trait]
impl super::Analyzer for MavenAnalyzer {
    async fn is_built(&self) -> Result<bool> {
        Ok(self.root.join("target").is_dir())
    }

    async fn analyze(&self) -> Result<Dependencies> {
        let pom = self.root.join("pom.xml");
        if !pom.exists() {
            bail!("no pom.xml in {}", self.root.display());
        }
        let content = super::read_manifest(&pom)?;
        let parsed = parse_pom_xml(&content)?;

        let mut deps = collect(ModuleType::Maven, parsed.dependencies);
        deps.revision = parsed.version;
        Ok(deps)
    }
}

/// Analyzer for Gradle projects.
///
/// `gradle.lockfile` entries are resolved versions and take precedence over
/// declarations in `build.gradle` / `build.gradle.kts`. Dependencies are
/// deduplicated by `group:artifact`.
pub struct GradleAnalyzer {
    root: PathBuf,
}

impl GradleAnalyzer {
    pub fn new(module: &Module) -> Result<Self> {
        Ok(Self {
            root: super::existing_dir(module)?,
        })
    }
}

#[async_trait]
impl super::Analyzer for GradleAnalyzer {
    async fn is_built(&self) -> Result<bool> {
        Ok(self.root.join("build").is_dir())
    }

    async fn analyze(&self) -> Result<Dependencies> {
        let mut coordinates = Vec::new();
        let mut found = false;

        let lockfile = self.root.join("gradle.lockfile");
        if lockfile.exists() {
            found = true;
            coordinates.extend(parse_gradle_lockfile(&super::read_manifest(&lockfile)?)?);
        }

        for gradle_file in ["build.gradle", "build.gradle.kts"] {
            let gradle = self.root.join(gradle_file);
            if gradle.exists() {
                found = true;
                coordinates.extend(parse_build_gradle(&super::read_manifest(&gradle)?)?);
            }
        }

        if !found {
            bail!(
                "no gradle.lockfile or build.gradle[.kts] in {}",
                self.root.display()
            );
        }
        Ok(collect(ModuleType::Gradle, coordinates))
    }
}

/// A `group:artifact:version` coordinate.
#[derive(Debug, Clone, PartialEq)]
struct Coordinate {
    group_id: String,
    artifact_id: String,
    version: String,
}

impl Coordinate {
    fn new(group_id: &str, artifact_id: &str, version: &str) -> Self {
        Self {
            group_id: group_id.to_string(),
            artifact_id: artifact_id.to_string(),
            version: version.to_string(),
        }
    }

    /// `group:artifact`, or just the artifact when the group is unknown.
    fn name(&self) -> String {
        if self.group_id.is_empty() {
            self.artifact_id.clone()
        } else {
            format!("{}:{}", self.group_id, self.artifact_id)
        }
    }
}

fn collect(ty: ModuleType, coordinates: Vec<Coordinate>) -> Dependencies {
    let mut deps = Dependencies::default();
    let mut seen: HashSet<String> = HashSet::new();
    for c in coordinates {
        let name = c.name();
        if !seen.insert(name.clone()) {
            continue;
        }
        let id = PackageId::new(ty, name.clone(), c.version.clone());
        deps.transitive.insert(id.clone(), Package::leaf(id.clone()));
        deps.direct.push(Import::new(format!("{}:{}", name, c.version), id));
    }
    deps
}

#[derive(Debug, Default)]
struct Pom {
    version: Option<String>,
    dependencies: Vec<Coordinate>,
}

/// Parse `pom.xml` using quick-xml event API. Test-scoped dependencies and
/// those under `<dependencyManagement>` / `<plugins>` are skipped.
fn parse_pom_xml(content: &str) -> Result<Pom> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut pom = Pom::default();
    let mut buf = Vec::new();
    let mut path: Vec<String> = Vec::new();

    let mut in_dependency = false;
    let mut group_id = String::new();
    let mut artifact_id = String::new();
    let mut version = String::new();
    let mut scope = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = String::from_utf8_lossy(e.name().local_name().as_ref()).into_owned();
                if name == "dependency"
                    && path.len() == 2
                    && path[0] == "project"
                    && path[1] == "dependencies"
                {
                    in_dependency = true;
                    group_id.clear();
                    artifact_id.clear();
                    version.clear();
                    scope.clear();
                }
                path.push(name);
            }
            Ok(Event::End(_)) => {
                let name = path.pop().unwrap_or_default();
                if name == "dependency" && in_dependency && path.len() == 2 {
                    if !artifact_id.is_empty() && scope != "test" {
                        pom.dependencies
                            .push(Coordinate::new(&group_id, &artifact_id, &version));
                    }
                    in_dependency = false;
                }
            }
            Ok(Event::Text(ref e)) => {
                let text = e.unescape().unwrap_or_default().to_string();
                let current = path.last().map(String::as_str).unwrap_or_default();
                if in_dependency && path.len() == 4 {
                    match current {
                        "groupId" => group_id = text,
                        "artifactId" => artifact_id = text,
                        "version" => version = text,
                        "scope" => scope = text,
                        _ => {}
                    }
                } else if path.len() == 2 && path[0] == "project" && current == "version" {
                    pom.version = Some(text);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => bail!("invalid pom.xml at byte {}: {}", reader.buffer_position(), e),
            _ => {}
        }
        buf.clear();
    }

    Ok(pom)
}

/// Parse `build.gradle` or `build.gradle.kts` with regex.
fn parse_build_gradle(content: &str) -> Result<Vec<Coordinate>> {
    let mut deps = Vec::new();

    // Matches: implementation 'group:artifact:version'
    //          implementation("group:artifact:version")
    let re_shorthand = Regex::new(
        r#"(?:implementation|api|compileOnly|runtimeOnly)\s*\(?\s*['"]([^'":]+):([^'":]+):([^'"]+)['"]"#,
    )?;

    for caps in re_shorthand.captures_iter(content) {
        deps.push(Coordinate::new(&caps[1], &caps[2], &caps[3]));
    }

    // Matches: group: 'com.example', name: 'foo', version: '1.0'
    let re_map = Regex::new(
        r#"(?:implementation|api|compileOnly|runtimeOnly)\s+group:\s*['"]([^'"]+)['"]\s*,\s*name:\s*['"]([^'"]+)['"]\s*,\s*version:\s*['"]([^'"]+)['"]"#,
    )?;

    for caps in re_map.captures_iter(content) {
        deps.push(Coordinate::new(&caps[1], &caps[2], &caps[3]));
    }

    Ok(deps)
}

/// Parse `gradle.lockfile`: format: `group:artifact:version=configurations`.
/// Entries locked only for test configurations are skipped.
fn parse_gradle_lockfile(content: &str) -> Result<Vec<Coordinate>> {
    let re = Regex::new(r"^([^:]+):([^:]+):([^=\s]+)(?:=(.*))?")?;
    let mut deps = Vec::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("empty=") {
            continue;
        }
        if let Some(caps) = re.captures(line) {
            let test_only = caps
                .get(4)
                .map(|c| c.as_str().split(',').all(|conf| conf.starts_with("test")))
                .unwrap_or(false);
            if !test_only {
                deps.push(Coordinate::new(&caps[1], &caps[2], &caps[3]));
            }
        }
    }

    Ok(deps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::Analyzer;

    #[test]
    fn test_parse_pom_xml() {
        let xml = r#"<?xml version="1.0"?>
<project>
  <groupId>com.acme</groupId>
  <artifactId>billing</artifactId>
  <version>2.4.1</version>
  <dependencyManagement>
    <dependencies>
      <dependency>
        <groupId>com.fasterxml.jackson</groupId>
        <artifactId>jackson-bom</artifactId>
        <version>2.15.0</version>
      </dependency>
    </dependencies>
  </dependencyManagement>
  <dependencies>
    <dependency>
      <groupId>org.apache.commons</groupId>
      <artifactId>commons-lang3</artifactId>
      <version>3.12.0</version>
    </dependency>
    <dependency>
      <groupId>junit</groupId>
      <artifactId>junit</artifactId>
      <version>4.13.2</version>
      <scope>test</scope>
    </dependency>
  </dependencies>
</project>"#;

        let pom = parse_pom_xml(xml).unwrap();
        assert_eq!(pom.version.as_deref(), Some("2.4.1"));
        assert_eq!(
            pom.dependencies,
            vec![Coordinate::new("org.apache.commons", "commons-lang3", "3.12.0")]
        );
    }

    #[test]
    fn test_parse_build_gradle() {
        let content = r#"
dependencies {
    implementation 'org.springframework:spring-core:5.3.23'
    implementation("com.google.guava:guava:31.1-jre")
    api group: 'org.slf4j', name: 'slf4j-api', version: '2.0.7'
    testImplementation 'junit:junit:4.13.2'
}
"#;
        let deps = parse_build_gradle(content).unwrap();
        assert_eq!(deps.len(), 3);
        assert_eq!(deps[1].name(), "com.google.guava:guava");
    }

    #[test]
    fn test_parse_gradle_lockfile() {
        let content = "\
# This is a Gradle generated file for dependency locking.
com.google.guava:guava:31.1-jre=compileClasspath,runtimeClasspath
junit:junit:4.13.2=testCompileClasspath,testRuntimeClasspath
empty=annotationProcessor
";
        let deps = parse_gradle_lockfile(content).unwrap();
        assert_eq!(deps, vec![Coordinate::new("com.google.guava", "guava", "31.1-jre")]);
    }

    #[tokio::test]
    async fn test_lockfile_version_wins_over_declaration() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("gradle.lockfile"),
            "com.google.guava:guava:32.0.0-jre=runtimeClasspath\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("build.gradle"),
            "dependencies { implementation 'com.google.guava:guava:31.1-jre' }\n",
        )
        .unwrap();

        let module = Module::new("api", ModuleType::Gradle, dir.path().to_string_lossy());
        let analyzer = GradleAnalyzer::new(&module).unwrap();
        assert!(!analyzer.is_built().await.unwrap());

        let deps = analyzer.analyze().await.unwrap();
        assert_eq!(deps.direct.len(), 1);
        assert_eq!(deps.direct[0].resolved.revision, "32.0.0-jre");
        assert_eq!(deps.direct[0].resolved.ty, ModuleType::Gradle);
    }
}
