use std::path::Path;

use kiln_model::{Severity, ValidationLevel, XmlDescriptorReader};

const FULL: &str = r#"<?xml version="1.0"?>
<project>
  <groupId>com.acme</groupId>
  <artifactId>widget</artifactId>
  <version>1.2.3</version>
  <packaging>pom</packaging>
  <name>Widget</name>
  <url>https://acme.example/widget/</url>
  <parent>
    <groupId>com.acme</groupId>
    <artifactId>parent</artifactId>
    <version>7</version>
  </parent>
  <modules>
    <module>core</module>
    <module>sub\ui</module>
  </modules>
  <properties>
    <widget.flavor>plain</widget.flavor>
  </properties>
  <dependencies>
    <dependency>
      <groupId>org.lib</groupId>
      <artifactId>util</artifactId>
      <version>2.0</version>
      <scope>test</scope>
      <optional>true</optional>
    </dependency>
  </dependencies>
  <dependencyManagement>
    <dependencies>
      <dependency>
        <groupId>org.lib</groupId>
        <artifactId>bom</artifactId>
        <version>5</version>
        <type>pom</type>
        <scope>import</scope>
      </dependency>
    </dependencies>
  </dependencyManagement>
  <build>
    <plugins>
      <plugin>
        <artifactId>compiler</artifactId>
        <version>3.1</version>
        <configuration>
          <release>17</release>
        </configuration>
      </plugin>
    </plugins>
  </build>
  <repositories>
    <repository>
      <id>internal</id>
      <url>https://repo.acme.example/releases</url>
    </repository>
  </repositories>
  <profiles>
    <profile>
      <id>ci</id>
      <activation>
        <property>
          <name>env.CI</name>
        </property>
      </activation>
      <properties>
        <widget.flavor>ci</widget.flavor>
      </properties>
    </profile>
  </profiles>
</project>
"#;

#[test]
fn reads_every_section() {
    let outcome = XmlDescriptorReader::read_str(FULL, None, ValidationLevel::Strict);
    assert!(!outcome.is_error(), "problems: {:?}", outcome.problems());
    let d = outcome.value().expect("descriptor");

    assert_eq!(d.group_id.as_deref(), Some("com.acme"));
    assert_eq!(d.artifact_id, "widget");
    assert_eq!(d.version.as_deref(), Some("1.2.3"));
    assert_eq!(d.packaging.as_deref(), Some("pom"));
    let parent = d.parent.as_ref().expect("parent");
    assert_eq!(parent.artifact_id, "parent");
    assert_eq!(parent.version, "7");
    assert_eq!(d.modules, vec!["core", "sub\\ui"]);
    assert_eq!(d.properties["widget.flavor"], "plain");

    assert_eq!(d.dependencies.len(), 1);
    let dep = &d.dependencies[0];
    assert_eq!(dep.scope.as_deref(), Some("test"));
    assert!(dep.optional);

    assert_eq!(d.dependency_management.len(), 1);
    assert!(d.dependency_management[0].is_import());

    assert_eq!(d.plugins.len(), 1);
    assert_eq!(d.plugins[0].configuration["release"], "17");

    assert_eq!(d.repositories.len(), 1);
    assert_eq!(d.repositories[0].id, "internal");

    assert_eq!(d.profiles.len(), 1);
    let profile = &d.profiles[0];
    assert_eq!(profile.id, "ci");
    let activation = profile.activation.as_ref().expect("activation");
    assert_eq!(activation.property.as_ref().unwrap().name, "env.CI");
    assert_eq!(profile.overlay.properties["widget.flavor"], "ci");
}

#[test]
fn missing_artifact_id_is_fatal() {
    let xml = "<project><groupId>g</groupId><version>1</version></project>";
    let outcome = XmlDescriptorReader::read_str(xml, None, ValidationLevel::Strict);
    assert!(outcome.is_error());
    assert!(
        outcome
            .problems()
            .iter()
            .any(|p| p.severity == Severity::Fatal && p.message.contains("artifactId"))
    );
}

#[test]
fn group_id_derives_from_parent() {
    let xml = r#"<project>
      <artifactId>child</artifactId>
      <parent><groupId>com.acme</groupId><artifactId>root</artifactId><version>1</version></parent>
    </project>"#;
    let outcome = XmlDescriptorReader::read_str(xml, None, ValidationLevel::Strict);
    assert!(!outcome.is_error(), "problems: {:?}", outcome.problems());
    let coord = outcome.value().unwrap().coordinate().expect("coordinate");
    assert_eq!(coord.to_string(), "com.acme:child");
}

#[test]
fn unknown_elements_warn_above_minimal() {
    let xml = r#"<project>
      <groupId>g</groupId><artifactId>a</artifactId><version>1</version>
      <distributionManagement><status>none</status></distributionManagement>
    </project>"#;
    let strict = XmlDescriptorReader::read_str(xml, None, ValidationLevel::Strict);
    assert!(!strict.is_error());
    assert!(
        strict
            .problems()
            .iter()
            .any(|p| p.severity == Severity::Warning
                && p.message.contains("distributionManagement"))
    );

    let minimal = XmlDescriptorReader::read_str(xml, None, ValidationLevel::Minimal);
    assert!(minimal.problems().is_empty());
}

#[test]
fn malformed_xml_is_fatal_with_cause() {
    let xml = "<project><artifactId>a</artifactId>";
    let outcome = XmlDescriptorReader::read_str(xml, Some(Path::new("broken/kiln.xml")), ValidationLevel::Strict);
    assert!(outcome.is_error());
    let problem = &outcome.problems()[0];
    assert_eq!(problem.severity, Severity::Fatal);
    assert!(problem.source.as_deref().unwrap().contains("broken"));
    assert!(problem.cause.is_some());
}

#[test]
fn duplicate_profile_ids_are_rejected() {
    let xml = r#"<project>
      <groupId>g</groupId><artifactId>a</artifactId><version>1</version>
      <profiles>
        <profile><id>p</id></profile>
        <profile><id>p</id></profile>
      </profiles>
    </project>"#;
    let outcome = XmlDescriptorReader::read_str(xml, None, ValidationLevel::Strict);
    assert!(outcome.is_error());
    assert!(
        outcome
            .problems()
            .iter()
            .any(|p| p.message.contains("Duplicate profile id"))
    );
}
